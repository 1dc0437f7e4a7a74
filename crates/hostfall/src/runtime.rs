//! Device runtime trait and the global runtime registry.
//!
//! A [`DeviceRuntime`] supplies the two transfer primitives the fallback
//! path leans on: batched device-to-host relocation and device-targeted
//! copies. Runtimes register themselves by backend key so the fallback
//! installed for a device can find its primitives at call time.

use crate::tensor::{BackendKey, Device, Tensor};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;

/// Failure of an underlying transfer or copy primitive. Always fatal to the
/// call that triggered it; the fallback propagates it verbatim.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransferError {
    message: String,
}

impl TransferError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transfer primitives one backend contributes to the fallback path.
pub trait DeviceRuntime: Send + Sync {
    /// The backend key this runtime serves.
    fn key(&self) -> &BackendKey;

    /// Batched device-to-host relocation. The input list contains no
    /// undefined entries; the output list has equal length and order.
    /// Backends are encouraged to coalesce the whole list into one transfer.
    fn transfer_to_host(&self, tensors: &[Tensor]) -> Result<Vec<Tensor>, TransferError>;

    /// Copies `src` (host-resident) into `dst`'s existing storage in place,
    /// resizing the destination when shapes differ. `dst` keeps its storage
    /// allocation and device tag.
    fn copy_from_host(&self, src: &Tensor, dst: &Tensor) -> Result<(), TransferError>;

    /// Copies a host-resident tensor to fresh storage on `device`.
    fn transfer_from_host(&self, tensor: &Tensor, device: &Device) -> Result<Tensor, TransferError>;
}

struct RuntimeRegistry {
    runtimes: RwLock<HashMap<BackendKey, Arc<dyn DeviceRuntime>>>,
}

impl RuntimeRegistry {
    fn new() -> Self {
        Self {
            runtimes: RwLock::new(HashMap::new()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<RuntimeRegistry> = OnceLock::new();

fn global_registry() -> &'static RuntimeRegistry {
    GLOBAL_REGISTRY.get_or_init(RuntimeRegistry::new)
}

/// Registers a device runtime under its own key, replacing any previous
/// registration. Called from backend crates at startup.
pub fn register_runtime(runtime: Arc<dyn DeviceRuntime>) {
    let key = runtime.key().clone();
    global_registry()
        .runtimes
        .write()
        .unwrap()
        .insert(key, runtime);
}

/// Looks up the runtime registered for `key`.
pub fn runtime_for(key: &BackendKey) -> Option<Arc<dyn DeviceRuntime>> {
    global_registry().runtimes.read().unwrap().get(key).cloned()
}

/// Lists the backend keys with a registered runtime.
pub fn list_runtimes() -> Vec<BackendKey> {
    global_registry()
        .runtimes
        .read()
        .unwrap()
        .keys()
        .cloned()
        .collect()
}

pub fn has_runtime(key: &BackendKey) -> bool {
    global_registry().runtimes.read().unwrap().contains_key(key)
}
