//! Host-redispatch fallback for a multi-backend tensor operator dispatcher.
//!
//! When a backend has not implemented an operator natively, the dispatcher
//! reroutes the call through [`fallback::host_fallback`]: tensor arguments
//! are relocated to host memory, the reference kernel runs there, and the
//! results are reconciled back onto the calling device, with mutable-alias
//! mutations copied into the original tensors.

pub mod advisory;
pub mod dispatch;
pub mod fallback;
pub mod runtime;
pub mod schema;
pub mod stack;
pub mod tensor;

pub use dispatch::{BoxedKernel, DispatchError, DispatchKey, Dispatcher, KernelError, OperatorHandle};
pub use fallback::{host_fallback, install_host_fallback, to_host, FallbackError};
pub use runtime::{register_runtime, runtime_for, DeviceRuntime, TransferError};
pub use schema::{AliasAnnotation, AliasSet, Argument, OperatorSchema};
pub use stack::{Stack, Value};
pub use tensor::{BackendKey, Device, Tensor};
