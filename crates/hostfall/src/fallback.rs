//! Host-redispatch fallback: relocate, rerun on the host, reconcile aliases.
//!
//! When a backend has no native kernel for an operator, the call is rerouted
//! here. Tensor arguments are relocated to host memory, the reference kernel
//! runs on the relocated stack, mutable-alias mutations are copied back into
//! the original device tensors, and returns are resolved back onto the
//! calling device.
//!
//! Immutable-alias (view) returns cannot be honored: a view must share
//! storage with its source, and relocated tensors live on a different device
//! than the originals. Those returns are degraded to plain copies and an
//! advisory is emitted. This is a declared limitation of the fallback, not a
//! defect; backends that need a view operator must implement it natively.

use crate::advisory::{self, Advisory};
use crate::dispatch::{DispatchKey, Dispatcher, KernelError, OperatorHandle};
use crate::runtime::{runtime_for, DeviceRuntime, TransferError};
use crate::schema::AliasAnnotation;
use crate::stack::{Stack, Value};
use crate::tensor::{BackendKey, Tensor};
use smallvec::SmallVec;
use std::sync::Arc;
use thiserror::Error;

/// Fatal failures of the fallback path. Every variant aborts the call with
/// no partial commit; advisories are not errors and do not appear here.
#[derive(Debug, Error)]
pub enum FallbackError {
    /// A mutable-alias return matched no mutable-alias input. The schema is
    /// malformed and is never silently patched over.
    #[error(
        "the operator {op} appears to have invalid alias information: the return at \
         position {return_slot} declares a mutable alias that matches no aliased input"
    )]
    SchemaInconsistency { op: String, return_slot: usize },
    #[error("relocating tensors to the host failed: {0}")]
    Relocation(#[source] TransferError),
    #[error("device-targeted copy failed: {0}")]
    Copy(#[source] TransferError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error("no device runtime registered for backend \"{key}\"")]
    MissingRuntime { key: BackendKey },
}

/// Relocates a list of tensor values to host residency.
///
/// Position-preserving and undefined-slot-preserving: the output has the
/// same length and order as the input, undefined slots pass through without
/// touching the transfer primitive. Defined entries are gathered first so
/// the backend can move them in one coalesced transfer instead of
/// one-by-one. When nothing is defined the primitive is never invoked.
pub fn to_host(
    runtime: &dyn DeviceRuntime,
    tensors: &[Option<Tensor>],
) -> Result<Vec<Option<Tensor>>, FallbackError> {
    let mut relocated: Vec<Option<Tensor>> = vec![None; tensors.len()];
    let mut translate = vec![false; tensors.len()];
    let mut defined: Vec<Tensor> = Vec::new();
    for (idx, tensor) in tensors.iter().enumerate() {
        if let Some(tensor) = tensor {
            translate[idx] = true;
            defined.push(tensor.clone());
        }
    }
    if defined.is_empty() {
        return Ok(relocated);
    }

    let moved = runtime
        .transfer_to_host(&defined)
        .map_err(FallbackError::Relocation)?;
    debug_assert_eq!(moved.len(), defined.len(), "transfer primitive changed list length");
    let mut moved = moved.into_iter();
    for (idx, slot) in relocated.iter_mut().enumerate() {
        if translate[idx] {
            *slot = moved.next();
        }
    }
    Ok(relocated)
}

/// Runs `op` on the host reference kernel after relocating its tensor
/// arguments, then reconciles aliases and moves returns back to the device.
///
/// The stack must be positioned with the schema's arguments on top; on
/// success its top holds exactly the schema's declared returns.
///
/// # Precondition
/// The operator has at least one defined tensor argument. The device used to
/// relocate returns is inferred once, from the first recorded tensor
/// argument; an operator with none has no device to infer and panics here.
pub fn host_fallback(
    op: &OperatorHandle,
    stack: &mut Stack,
    runtime: &dyn DeviceRuntime,
) -> Result<(), FallbackError> {
    let schema = op.schema();
    let num_arguments = schema.arguments().len();
    let arguments_begin = stack.base_of_last(num_arguments);

    let mut tensor_args: Vec<Option<Tensor>> = Vec::new();
    let mut tensor_args_indices: SmallVec<[usize; 8]> = SmallVec::new();

    // Step 1: record single-tensor arguments; relocate each tensor-list
    // argument independently and write it back in place. Lists are not
    // batched with each other or with the single tensors.
    for idx in 0..num_arguments {
        let slot = arguments_begin + idx;
        let list = match stack.get(slot) {
            Value::Tensor(tensor) => {
                tensor_args.push(tensor.clone());
                tensor_args_indices.push(idx);
                None
            }
            Value::TensorList(list) => Some(list.clone()),
            _ => None,
        };
        if let Some(list) = list {
            let relocated = to_host(runtime, &list)?;
            stack.set(slot, Value::TensorList(relocated));
        }
    }

    // Step 2: one batched relocation for the recorded tensors, then
    // overwrite their stack slots with the host-resident values.
    let host_tensors = to_host(runtime, &tensor_args)?;
    for (i, &idx) in tensor_args_indices.iter().enumerate() {
        stack.set(arguments_begin + idx, Value::Tensor(host_tensors[i].clone()));
    }

    // Step 3: run the reference implementation, routed strictly to the host
    // kernel so the fallback can never re-enter itself.
    op.redispatch(&DispatchKey::Host, stack)?;

    // Step 4: mutable-alias inputs. The host kernel mutated the relocated
    // tensor, not the original; relocated and original storage cannot alias
    // across devices, so the mutation is reconciled by an explicit copy back
    // into the original tensor's storage (resizing it when the kernel did).
    for (i, &idx) in tensor_args_indices.iter().enumerate() {
        let alias = schema.arguments()[idx].alias();
        if alias.is_some_and(AliasAnnotation::is_write) {
            if let (Some(host), Some(original)) = (&host_tensors[i], &tensor_args[i]) {
                runtime
                    .copy_from_host(host, original)
                    .map_err(FallbackError::Copy)?;
            }
        }
    }

    // Step 5: resolve returns. Device inference happens once, from the
    // first recorded tensor argument.
    let num_returns = schema.returns().len();
    let returns_begin = stack.base_of_last(num_returns);
    let target_device = tensor_args
        .iter()
        .flatten()
        .next()
        .map(|tensor| tensor.device().clone());

    for idx in 0..num_returns {
        let returned = match stack.get(returns_begin + idx) {
            Value::Tensor(Some(tensor)) => tensor.clone(),
            _ => continue,
        };
        match schema.returns()[idx].alias() {
            Some(ret_alias) if ret_alias.is_write() => {
                // Mutable-alias return: substitute the original input tensor
                // object, preserving its device and identity. Matching is
                // structural on the annotation tokens.
                let mut found_alias = false;
                for (i, &arg_idx) in tensor_args_indices.iter().enumerate() {
                    if tensor_args[i].is_none() {
                        continue;
                    }
                    if schema.arguments()[arg_idx].alias() == Some(ret_alias) {
                        stack.set(returns_begin + idx, tensor_args[i].clone());
                        found_alias = true;
                        break;
                    }
                }
                if !found_alias {
                    return Err(FallbackError::SchemaInconsistency {
                        op: schema.name().to_string(),
                        return_slot: idx,
                    });
                }
            }
            ret_alias => {
                let device = target_device.as_ref().expect(
                    "host fallback precondition: at least one tensor argument is required \
                     to infer the return device",
                );
                if ret_alias.is_some() {
                    // Immutable alias: a view cannot survive relocation.
                    // Degrade to a copy and say so.
                    advisory::emit(Advisory::unsupported_view(schema.name(), device));
                }
                let relocated = runtime
                    .transfer_from_host(&returned, device)
                    .map_err(FallbackError::Copy)?;
                stack.set(returns_begin + idx, relocated);
            }
        }
    }

    Ok(())
}

/// Looks up the device runtime for `key` and installs the host fallback as
/// that backend's capability on `dispatcher`.
pub fn install_host_fallback(dispatcher: &Dispatcher, key: BackendKey) -> Result<(), FallbackError> {
    let runtime = runtime_for(&key).ok_or_else(|| FallbackError::MissingRuntime { key: key.clone() })?;
    dispatcher.register_fallback(
        key,
        Arc::new(move |op: &OperatorHandle, stack: &mut Stack| {
            host_fallback(op, stack, runtime.as_ref())
        }),
    );
    Ok(())
}
