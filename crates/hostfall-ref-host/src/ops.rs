//! Schemas and host kernels for the reference operator library.
//!
//! Kernels follow the stack calling convention: arguments on top of the
//! stack on entry, exactly the declared returns on top on exit. In-place
//! operators mutate their argument's storage and return the same tensor
//! object, which is what the fallback's alias reconciliation expects.

use hostfall::{
    AliasAnnotation, Argument, BoxedKernel, Device, KernelError, OperatorHandle, OperatorSchema,
    Stack, Tensor, Value,
};
use std::sync::Arc;

/// Every reference operator, paired schema and kernel.
pub fn kernel_library() -> Vec<(OperatorSchema, BoxedKernel)> {
    vec![
        (add_schema(), add_kernel()),
        (add_inplace_schema(), add_inplace_kernel()),
        (mul_schema(), mul_kernel()),
        (abs_schema(), abs_kernel()),
        (fill_inplace_schema(), fill_inplace_kernel()),
        (view_as_schema(), view_as_kernel()),
        (sum_list_schema(), sum_list_kernel()),
    ]
}

fn pop_args(op: &OperatorHandle, stack: &mut Stack) -> Vec<Value> {
    stack.drain_last(op.schema().arguments().len())
}

fn tensor_at<'a>(
    op: &OperatorHandle,
    args: &'a [Value],
    idx: usize,
) -> Result<&'a Tensor, KernelError> {
    args[idx].as_tensor().ok_or_else(|| {
        KernelError::execution(
            op.name(),
            format!(
                "argument {idx} ({}) must be a defined tensor",
                op.schema().arguments()[idx].name()
            ),
        )
    })
}

fn float_at(op: &OperatorHandle, args: &[Value], idx: usize) -> Result<f64, KernelError> {
    match &args[idx] {
        Value::Float(v) => Ok(*v),
        Value::Int(v) => Ok(*v as f64),
        _ => Err(KernelError::execution(
            op.name(),
            format!("argument {idx} must be a scalar"),
        )),
    }
}

fn list_at<'a>(
    op: &OperatorHandle,
    args: &'a [Value],
    idx: usize,
) -> Result<&'a [Option<Tensor>], KernelError> {
    match &args[idx] {
        Value::TensorList(list) => Ok(list),
        _ => Err(KernelError::execution(
            op.name(),
            format!("argument {idx} must be a tensor list"),
        )),
    }
}

fn host_tensor(
    op: &OperatorHandle,
    shape: Vec<usize>,
    data: Vec<f32>,
) -> Result<Tensor, KernelError> {
    Tensor::from_vec(Device::Host, shape, data)
        .map_err(|e| KernelError::execution(op.name(), e.to_string()))
}

fn binary_elementwise(
    op: &OperatorHandle,
    lhs: &Tensor,
    rhs: &Tensor,
    f: impl Fn(f32, f32) -> f32,
) -> Result<Tensor, KernelError> {
    let shape = lhs.shape();
    if shape != rhs.shape() {
        return Err(KernelError::execution(
            op.name(),
            format!("shape mismatch: {:?} vs {:?}", shape, rhs.shape()),
        ));
    }
    let lhs = lhs.to_vec();
    let rhs = rhs.to_vec();
    let data = lhs.iter().zip(&rhs).map(|(a, b)| f(*a, *b)).collect();
    host_tensor(op, shape, data)
}

// add(Tensor self, Tensor other) -> Tensor

pub fn add_schema() -> OperatorSchema {
    OperatorSchema::new("add")
        .with_argument(Argument::plain("self"))
        .with_argument(Argument::plain("other"))
        .with_return(Argument::plain(""))
}

pub fn add_kernel() -> BoxedKernel {
    Arc::new(|op, stack| {
        let args = pop_args(op, stack);
        let out = binary_elementwise(
            op,
            tensor_at(op, &args, 0)?,
            tensor_at(op, &args, 1)?,
            |a, b| a + b,
        )?;
        stack.push(out);
        Ok(())
    })
}

// add_(Tensor(a!) self, Tensor other) -> Tensor(a!)

pub fn add_inplace_schema() -> OperatorSchema {
    OperatorSchema::new("add_")
        .with_argument(Argument::aliased("self", AliasAnnotation::write("a")))
        .with_argument(Argument::plain("other"))
        .with_return(Argument::aliased("", AliasAnnotation::write("a")))
}

pub fn add_inplace_kernel() -> BoxedKernel {
    Arc::new(|op, stack| {
        let args = pop_args(op, stack);
        let this = tensor_at(op, &args, 0)?.clone();
        let out = binary_elementwise(op, &this, tensor_at(op, &args, 1)?, |a, b| a + b)?;
        this.assign(out.shape(), out.to_vec())
            .map_err(|e| KernelError::execution(op.name(), e.to_string()))?;
        stack.push(this);
        Ok(())
    })
}

// mul(Tensor self, Tensor other) -> Tensor

pub fn mul_schema() -> OperatorSchema {
    OperatorSchema::new("mul")
        .with_argument(Argument::plain("self"))
        .with_argument(Argument::plain("other"))
        .with_return(Argument::plain(""))
}

pub fn mul_kernel() -> BoxedKernel {
    Arc::new(|op, stack| {
        let args = pop_args(op, stack);
        let out = binary_elementwise(
            op,
            tensor_at(op, &args, 0)?,
            tensor_at(op, &args, 1)?,
            |a, b| a * b,
        )?;
        stack.push(out);
        Ok(())
    })
}

// abs(Tensor self) -> Tensor

pub fn abs_schema() -> OperatorSchema {
    OperatorSchema::new("abs")
        .with_argument(Argument::plain("self"))
        .with_return(Argument::plain(""))
}

pub fn abs_kernel() -> BoxedKernel {
    Arc::new(|op, stack| {
        let args = pop_args(op, stack);
        let this = tensor_at(op, &args, 0)?;
        let data = this.to_vec().iter().map(|v| v.abs()).collect();
        let out = host_tensor(op, this.shape(), data)?;
        stack.push(out);
        Ok(())
    })
}

// fill_(Tensor(a!) self, Scalar value) -> ()
//
// Mutates its input and declares no returns, exercising the write-back
// path without any return resolution.

pub fn fill_inplace_schema() -> OperatorSchema {
    OperatorSchema::new("fill_")
        .with_argument(Argument::aliased("self", AliasAnnotation::write("a")))
        .with_argument(Argument::plain("value"))
}

pub fn fill_inplace_kernel() -> BoxedKernel {
    Arc::new(|op, stack| {
        let args = pop_args(op, stack);
        let this = tensor_at(op, &args, 0)?;
        let value = float_at(op, &args, 1)? as f32;
        this.map_inplace(|_| value);
        Ok(())
    })
}

// view_as(Tensor(a) self, Tensor other) -> Tensor(a)
//
// On the host this is a genuine view when the shapes already agree; with a
// differing shape the storage cannot carry both, so the kernel reshapes a
// copy. Either way the element count must match.

pub fn view_as_schema() -> OperatorSchema {
    OperatorSchema::new("view_as")
        .with_argument(Argument::aliased("self", AliasAnnotation::read("a")))
        .with_argument(Argument::plain("other"))
        .with_return(Argument::aliased("", AliasAnnotation::read("a")))
}

pub fn view_as_kernel() -> BoxedKernel {
    Arc::new(|op, stack| {
        let args = pop_args(op, stack);
        let this = tensor_at(op, &args, 0)?;
        let other = tensor_at(op, &args, 1)?;
        if this.numel() != other.numel() {
            return Err(KernelError::execution(
                op.name(),
                format!(
                    "cannot view {} elements as shape {:?}",
                    this.numel(),
                    other.shape()
                ),
            ));
        }
        let out = if this.shape() == other.shape() {
            this.clone()
        } else {
            host_tensor(op, other.shape(), this.to_vec())?
        };
        stack.push(out);
        Ok(())
    })
}

// sum_list(Tensor seed, Tensor[] tensors) -> Tensor
//
// Accumulates every defined tensor in the list onto the seed. Undefined
// entries are skipped.

pub fn sum_list_schema() -> OperatorSchema {
    OperatorSchema::new("sum_list")
        .with_argument(Argument::plain("seed"))
        .with_argument(Argument::plain("tensors"))
        .with_return(Argument::plain(""))
}

pub fn sum_list_kernel() -> BoxedKernel {
    Arc::new(|op, stack| {
        let args = pop_args(op, stack);
        let seed = tensor_at(op, &args, 0)?;
        let list = list_at(op, &args, 1)?;
        let shape = seed.shape();
        let mut acc = seed.to_vec();
        for tensor in list.iter().flatten() {
            if tensor.shape() != shape {
                return Err(KernelError::execution(
                    op.name(),
                    format!("shape mismatch in list: {:?} vs {:?}", tensor.shape(), shape),
                ));
            }
            for (a, b) in acc.iter_mut().zip(tensor.to_vec()) {
                *a += b;
            }
        }
        let out = host_tensor(op, shape, acc)?;
        stack.push(out);
        Ok(())
    })
}
