//! Shared fixtures: a recording mock device runtime and dispatcher setup.
#![allow(dead_code)]

use hostfall::runtime::{DeviceRuntime, TransferError};
use hostfall::{host_fallback, BackendKey, Device, Dispatcher, OperatorHandle, Stack, Tensor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Dispatcher with the reference host kernels installed and the host
/// fallback wired to a fresh mock backend named `name`.
pub fn fixture(name: &str) -> (Dispatcher, Arc<MockDevice>) {
    let dispatcher = Dispatcher::new();
    hostfall_ref_host::install(&dispatcher);
    let runtime = Arc::new(MockDevice::new(name));
    let rt = Arc::clone(&runtime);
    dispatcher.register_fallback(
        runtime.key(),
        Arc::new(move |op: &OperatorHandle, stack: &mut Stack| {
            host_fallback(op, stack, rt.as_ref())
        }),
    );
    (dispatcher, runtime)
}

/// Fake backend whose transfer primitives copy payloads between fresh
/// storage allocations, counting every invocation.
pub struct MockDevice {
    key: BackendKey,
    transfer_calls: AtomicUsize,
    tensors_moved: AtomicUsize,
    copy_backs: AtomicUsize,
}

impl MockDevice {
    pub fn new(name: &str) -> Self {
        Self {
            key: BackendKey::new(name),
            transfer_calls: AtomicUsize::new(0),
            tensors_moved: AtomicUsize::new(0),
            copy_backs: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> BackendKey {
        self.key.clone()
    }

    pub fn device(&self) -> Device {
        Device::Backend(self.key.clone())
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn tensors_moved(&self) -> usize {
        self.tensors_moved.load(Ordering::SeqCst)
    }

    pub fn copy_backs(&self) -> usize {
        self.copy_backs.load(Ordering::SeqCst)
    }
}

impl DeviceRuntime for MockDevice {
    fn key(&self) -> &BackendKey {
        &self.key
    }

    fn transfer_to_host(&self, tensors: &[Tensor]) -> Result<Vec<Tensor>, TransferError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.tensors_moved.fetch_add(tensors.len(), Ordering::SeqCst);
        Ok(tensors.iter().map(|t| t.copy_to(Device::Host)).collect())
    }

    fn copy_from_host(&self, src: &Tensor, dst: &Tensor) -> Result<(), TransferError> {
        self.copy_backs.fetch_add(1, Ordering::SeqCst);
        dst.assign(src.shape(), src.to_vec())
            .map_err(|e| TransferError::new(e.to_string()))
    }

    fn transfer_from_host(&self, tensor: &Tensor, device: &Device) -> Result<Tensor, TransferError> {
        Ok(tensor.copy_to(device.clone()))
    }
}
