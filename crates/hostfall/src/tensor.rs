//! Device-tagged tensor values shared through the dispatch stack.
//!
//! A [`Tensor`] pairs a [`Device`] with a reference-counted storage cell.
//! Cloning a tensor clones the handle, not the payload: clones observe each
//! other's in-place mutations, which is what alias reconciliation relies on.

use anyhow::{bail, Result};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Identifies a registered hardware backend (e.g. `"cuda"`, `"npu"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey(Arc<str>);

impl BackendKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Residency of a tensor: the host reference device or a named backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Device {
    Host,
    Backend(BackendKey),
}

impl Device {
    pub fn backend(name: impl Into<String>) -> Self {
        Device::Backend(BackendKey::new(name))
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Device::Host)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Host => f.write_str("host"),
            Device::Backend(key) => write!(f, "{key}"),
        }
    }
}

/// Shape and payload guarded together so in-place resizes stay atomic.
#[derive(Debug)]
struct Cell {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Dense `f32` tensor with shared storage and a device tag.
///
/// The dispatch layer never interprets element values; `f32` payloads are
/// enough for the reference kernels and keep the storage model simple.
#[derive(Debug, Clone)]
pub struct Tensor {
    device: Device,
    storage: Arc<Mutex<Cell>>,
}

impl Tensor {
    /// Builds a tensor from raw values, validating the length against the shape.
    pub fn from_vec(device: Device, shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            bail!(
                "tensor data length ({}) does not match shape {:?}",
                data.len(),
                shape
            );
        }
        Ok(Tensor {
            device,
            storage: Arc::new(Mutex::new(Cell { shape, data })),
        })
    }

    /// Returns a zero-initialized tensor of the requested shape.
    pub fn zeros(device: Device, shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Tensor {
            device,
            storage: Arc::new(Mutex::new(Cell {
                shape,
                data: vec![0.0; len],
            })),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn shape(&self) -> Vec<usize> {
        self.storage.lock().unwrap().shape.clone()
    }

    pub fn numel(&self) -> usize {
        self.storage.lock().unwrap().data.len()
    }

    /// Copies the payload out of the storage cell.
    pub fn to_vec(&self) -> Vec<f32> {
        self.storage.lock().unwrap().data.clone()
    }

    /// Runs `f` against the payload without copying it out.
    pub fn with_data<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        let cell = self.storage.lock().unwrap();
        f(&cell.data)
    }

    /// Overwrites shape and payload in place, growing or shrinking the
    /// storage as needed. The storage allocation and device tag survive, so
    /// every clone of this tensor observes the new contents.
    pub fn assign(&self, shape: Vec<usize>, data: Vec<f32>) -> Result<()> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            bail!(
                "assigned data length ({}) does not match shape {:?}",
                data.len(),
                shape
            );
        }
        let mut cell = self.storage.lock().unwrap();
        cell.shape = shape;
        cell.data = data;
        Ok(())
    }

    /// Applies `f` to every element in place.
    pub fn map_inplace(&self, f: impl Fn(f32) -> f32) {
        let mut cell = self.storage.lock().unwrap();
        for v in &mut cell.data {
            *v = f(*v);
        }
    }

    /// Deep copy onto `device` with fresh storage.
    pub fn copy_to(&self, device: Device) -> Self {
        let cell = self.storage.lock().unwrap();
        Tensor {
            device,
            storage: Arc::new(Mutex::new(Cell {
                shape: cell.shape.clone(),
                data: cell.data.clone(),
            })),
        }
    }

    /// True when both handles point at the same storage allocation.
    pub fn same_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// True when the handles denote the same tensor object: same storage
    /// allocation on the same device.
    pub fn same_identity(&self, other: &Tensor) -> bool {
        self.device == other.device && self.same_storage(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_length_mismatch() {
        let err = Tensor::from_vec(Device::Host, vec![2, 3], vec![1.0; 5]);
        assert!(err.is_err());
    }

    #[test]
    fn clones_share_storage_and_observe_assign() {
        let a = Tensor::from_vec(Device::Host, vec![2], vec![1.0, 2.0]).unwrap();
        let b = a.clone();
        assert!(a.same_identity(&b));
        a.assign(vec![3], vec![7.0, 8.0, 9.0]).unwrap();
        assert_eq!(b.shape(), vec![3]);
        assert_eq!(b.to_vec(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn copy_to_breaks_storage_sharing() {
        let a = Tensor::from_vec(Device::backend("mock"), vec![2], vec![1.0, 2.0]).unwrap();
        let b = a.copy_to(Device::Host);
        assert!(!a.same_storage(&b));
        assert!(b.device().is_host());
        b.assign(vec![2], vec![0.0, 0.0]).unwrap();
        assert_eq!(a.to_vec(), vec![1.0, 2.0]);
    }
}
