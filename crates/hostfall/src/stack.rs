//! Untyped, position-addressed value stack shared between caller and kernels.
//!
//! Kernels receive their arguments at the top of the stack and must leave
//! exactly the schema's declared returns there. The fallback path only ever
//! inspects the `Tensor` and `TensorList` variants; everything else is passed
//! through unexamined.

use crate::tensor::Tensor;

/// Tagged value occupying one stack slot. `Tensor(None)` is the undefined
/// tensor; it flows through relocation untouched.
#[derive(Debug, Clone)]
pub enum Value {
    Tensor(Option<Tensor>),
    TensorList(Vec<Option<Tensor>>),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl Value {
    /// Borrows the defined tensor in this slot, if any.
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(Some(t)) => Some(t),
            _ => None,
        }
    }

}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Value::Tensor(Some(tensor))
    }
}

impl From<Option<Tensor>> for Value {
    fn from(tensor: Option<Tensor>) -> Self {
        Value::Tensor(tensor)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Growable stack with absolute addressing for in-place slot rewrites.
#[derive(Debug, Default, Clone)]
pub struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    /// Borrows the slot at absolute position `idx`.
    ///
    /// # Panics
    /// Panics when `idx` is out of bounds; slot positions are derived from
    /// the operator schema, so a miss is a caller bug.
    pub fn get(&self, idx: usize) -> &Value {
        &self.values[idx]
    }

    /// Overwrites the slot at absolute position `idx` in place.
    pub fn set(&mut self, idx: usize, value: impl Into<Value>) {
        self.values[idx] = value.into();
    }

    /// Absolute position of the first of the top `n` slots.
    pub fn base_of_last(&self, n: usize) -> usize {
        self.values.len() - n
    }

    /// Removes the top `n` slots and returns them in stack order.
    pub fn drain_last(&mut self, n: usize) -> Vec<Value> {
        self.values.split_off(self.values.len() - n)
    }
}
