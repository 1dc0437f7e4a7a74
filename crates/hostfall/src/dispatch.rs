//! Operator registration and dispatch-key routing.
//!
//! The dispatcher keeps one [`OperatorHandle`] per operator name. Each handle
//! owns its schema and a per-key table of boxed kernels. Backend keys with no
//! native kernel fall through to the fallback callback registered for that
//! backend, which is how the host-redispatch path gets attached to a device.

use crate::fallback::FallbackError;
use crate::schema::OperatorSchema;
use crate::stack::Stack;
use crate::tensor::BackendKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Routing target for one dispatch. `Host` is the restricted key that
/// reaches the reference implementation directly, bypassing backend
/// selection and any registered fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    Host,
    Backend(BackendKey),
}

impl DispatchKey {
    pub fn backend(name: impl Into<String>) -> Self {
        DispatchKey::Backend(BackendKey::new(name))
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchKey::Host => f.write_str("host"),
            DispatchKey::Backend(key) => write!(f, "{key}"),
        }
    }
}

/// Errors surfaced by kernel lookup and execution.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("operator {op} has no kernel registered for dispatch key \"{key}\"")]
    MissingKernel { op: String, key: DispatchKey },
    #[error("kernel for {op} failed: {message}")]
    Execution { op: String, message: String },
}

impl KernelError {
    pub fn execution(op: impl Into<String>, message: impl Into<String>) -> Self {
        KernelError::Execution {
            op: op.into(),
            message: message.into(),
        }
    }
}

/// Boxed kernel invoked with the operator handle and the shared stack.
pub type BoxedKernel = Arc<dyn Fn(&OperatorHandle, &mut Stack) -> Result<(), KernelError> + Send + Sync>;

/// Fallback callback registered per backend key; conforms to the same
/// handle-plus-stack calling convention as a boxed kernel.
pub type FallbackFn = Arc<dyn Fn(&OperatorHandle, &mut Stack) -> Result<(), FallbackError> + Send + Sync>;

/// A registered operator: schema plus per-key kernel table.
pub struct OperatorHandle {
    schema: Arc<OperatorSchema>,
    kernels: HashMap<DispatchKey, BoxedKernel>,
}

impl OperatorHandle {
    pub fn new(schema: OperatorSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            kernels: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &OperatorSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn has_kernel(&self, key: &DispatchKey) -> bool {
        self.kernels.contains_key(key)
    }

    fn insert_kernel(&mut self, key: DispatchKey, kernel: BoxedKernel) {
        self.kernels.insert(key, kernel);
    }

    /// Invokes the kernel registered for exactly `key`, with no further
    /// routing. Called with [`DispatchKey::Host`] this reaches the reference
    /// implementation and can never re-enter a fallback.
    pub fn redispatch(&self, key: &DispatchKey, stack: &mut Stack) -> Result<(), KernelError> {
        let kernel = self
            .kernels
            .get(key)
            .ok_or_else(|| KernelError::MissingKernel {
                op: self.name().to_string(),
                key: key.clone(),
            })?;
        kernel(self, stack)
    }
}

impl fmt::Debug for OperatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorHandle")
            .field("schema", &self.schema)
            .field("keys", &self.kernels.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors surfaced by [`Dispatcher::call`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no operator registered under the name {name}")]
    UnknownOperator { name: String },
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Fallback(#[from] FallbackError),
}

/// Operator table plus the per-backend fallback capability registry.
#[derive(Default)]
pub struct Dispatcher {
    ops: RwLock<HashMap<String, Arc<OperatorHandle>>>,
    fallbacks: RwLock<HashMap<BackendKey, FallbackFn>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operator schema, replacing any previous registration of
    /// the same name.
    pub fn register_schema(&self, schema: OperatorSchema) {
        let name = schema.name().to_string();
        self.ops
            .write()
            .unwrap()
            .insert(name, Arc::new(OperatorHandle::new(schema)));
    }

    /// Attaches a kernel to an already-registered operator under `key`.
    pub fn register_kernel(
        &self,
        op: &str,
        key: DispatchKey,
        kernel: BoxedKernel,
    ) -> Result<(), DispatchError> {
        let mut ops = self.ops.write().unwrap();
        let handle = ops.get(op).ok_or_else(|| DispatchError::UnknownOperator {
            name: op.to_string(),
        })?;
        // Handles are shared read-only once dispatched; rebuild on mutation.
        let mut rebuilt = OperatorHandle {
            schema: Arc::clone(&handle.schema),
            kernels: handle.kernels.clone(),
        };
        rebuilt.insert_kernel(key, kernel);
        ops.insert(op.to_string(), Arc::new(rebuilt));
        Ok(())
    }

    /// Installs the fallback callback for every call routed to `key` whose
    /// operator has no native kernel there.
    pub fn register_fallback(&self, key: BackendKey, fallback: FallbackFn) {
        self.fallbacks.write().unwrap().insert(key, fallback);
    }

    pub fn lookup(&self, op: &str) -> Option<Arc<OperatorHandle>> {
        self.ops.read().unwrap().get(op).cloned()
    }

    pub fn list_operators(&self) -> Vec<String> {
        self.ops.read().unwrap().keys().cloned().collect()
    }

    /// Routes one call: the native kernel for `key` when present, otherwise
    /// the backend's registered fallback, otherwise a missing-kernel error.
    pub fn call(&self, op: &str, key: &DispatchKey, stack: &mut Stack) -> Result<(), DispatchError> {
        let handle = self
            .lookup(op)
            .ok_or_else(|| DispatchError::UnknownOperator {
                name: op.to_string(),
            })?;
        if handle.has_kernel(key) {
            handle.redispatch(key, stack)?;
            return Ok(());
        }
        if let DispatchKey::Backend(backend) = key {
            let fallback = self.fallbacks.read().unwrap().get(backend).cloned();
            if let Some(fallback) = fallback {
                log::debug!("operator {op} has no {key} kernel, taking the host fallback");
                fallback(&handle, stack)?;
                return Ok(());
            }
        }
        Err(KernelError::MissingKernel {
            op: op.to_string(),
            key: key.clone(),
        }
        .into())
    }
}
