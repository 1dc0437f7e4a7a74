//! Operator schemas: argument/return descriptors and alias annotations.
//!
//! Alias annotations carry an interned set token established when the schema
//! is built. Matching an output annotation against an input annotation
//! compares tokens structurally, never pointer identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Interned alias-set token (the `a` in `Tensor(a!)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasSet(Arc<str>);

impl AliasSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for AliasSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AliasSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(AliasSet::new(name))
    }
}

/// Declares that a schema position shares storage with the other positions
/// carrying the same set token. `write` marks the alias as mutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasAnnotation {
    set: AliasSet,
    write: bool,
}

impl AliasAnnotation {
    /// Mutable alias (`Tensor(a!)`).
    pub fn write(set: impl Into<String>) -> Self {
        Self {
            set: AliasSet::new(set),
            write: true,
        }
    }

    /// Immutable alias / view (`Tensor(a)`).
    pub fn read(set: impl Into<String>) -> Self {
        Self {
            set: AliasSet::new(set),
            write: false,
        }
    }

    pub fn set(&self) -> &AliasSet {
        &self.set
    }

    pub fn is_write(&self) -> bool {
        self.write
    }
}

impl fmt::Display for AliasAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.set.as_str(), if self.write { "!" } else { "" })
    }
}

/// One argument or return descriptor in an operator schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    name: String,
    alias: Option<AliasAnnotation>,
}

impl Argument {
    /// Descriptor with no alias annotation.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Descriptor carrying an alias annotation.
    pub fn aliased(name: impl Into<String>, alias: AliasAnnotation) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&AliasAnnotation> {
        self.alias.as_ref()
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) if self.name.is_empty() => write!(f, "Tensor({alias})"),
            Some(alias) => write!(f, "Tensor({alias}) {}", self.name),
            None if self.name.is_empty() => write!(f, "Tensor"),
            None => write!(f, "Tensor {}", self.name),
        }
    }
}

/// Declarative signature of an operator: ordered argument and return
/// descriptors, built programmatically (schema text parsing lives upstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSchema {
    name: String,
    arguments: Vec<Argument>,
    returns: Vec<Argument>,
}

impl OperatorSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_return(mut self, ret: Argument) -> Self {
        self.returns.push(ret);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn returns(&self) -> &[Argument] {
        &self.returns
    }
}

impl fmt::Display for OperatorSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") -> (")?;
        for (i, ret) in self.returns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ret}")?;
        }
        write!(f, ")")
    }
}
