//! Reference host kernels for the hostfall dispatcher.
//!
//! Each operator module exposes its schema and a boxed kernel operating on
//! the untyped stack. [`install`] registers the whole library on a
//! dispatcher under the restricted host key, which is where the fallback
//! path redispatches to.

pub mod ops;

use hostfall::{DispatchKey, Dispatcher};

/// Registers every reference operator's schema and host kernel.
pub fn install(dispatcher: &Dispatcher) {
    for (schema, kernel) in ops::kernel_library() {
        let name = schema.name().to_string();
        dispatcher.register_schema(schema);
        dispatcher
            .register_kernel(&name, DispatchKey::Host, kernel)
            .expect("schema registered above");
    }
}
