//! Non-fatal advisories raised while a fallback call proceeds.
//!
//! The only advisory today is the degraded-view notice: an immutable-alias
//! return cannot keep view semantics across devices, so the fallback copies
//! instead and tells someone about it. Advisories go to `log::warn!` unless
//! a capture scope is active on the current thread; capture scopes exist so
//! tests can assert on them without a logger.

use crate::tensor::Device;
use std::cell::RefCell;
use std::fmt;

/// One recorded advisory.
#[derive(Debug, Clone)]
pub struct Advisory {
    pub operator: String,
    pub device: Device,
    pub message: String,
}

impl Advisory {
    /// Advisory for a view operator degraded to a device copy.
    pub fn unsupported_view(operator: &str, device: &Device) -> Self {
        let message = format!(
            "the operator {operator} appears to be a view operator, but it has no \
             implementation for the backend \"{device}\"; view operators cannot fall \
             back to the host because the tensor's storage cannot be shared across \
             devices, so the result was materialized as a copy"
        );
        Advisory {
            operator: operator.to_string(),
            device: device.clone(),
            message,
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

thread_local! {
    static CAPTURE_SCOPES: RefCell<Vec<Vec<Advisory>>> = const { RefCell::new(Vec::new()) };
}

/// Emits an advisory: recorded by the innermost capture scope on this
/// thread, or logged at `warn` level when none is active.
pub fn emit(advisory: Advisory) {
    let captured = CAPTURE_SCOPES.with(|scopes| {
        if let Some(top) = scopes.borrow_mut().last_mut() {
            top.push(advisory.clone());
            true
        } else {
            false
        }
    });
    if !captured {
        log::warn!("{advisory}");
    }
}

/// Runs `f` with a capture scope installed and returns whatever it produced
/// together with the advisories emitted on this thread while it ran.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Advisory>) {
    CAPTURE_SCOPES.with(|scopes| scopes.borrow_mut().push(Vec::new()));
    let result = f();
    let recorded = CAPTURE_SCOPES.with(|scopes| {
        scopes
            .borrow_mut()
            .pop()
            .expect("advisory capture scope disappeared")
    });
    (result, recorded)
}
