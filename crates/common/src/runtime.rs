//! The callback seam between native functions and the machine running them.

use crate::value::{ErrorValue, Map, Value};

/// Something that can invoke Kenpali function values.
///
/// Native functions receive a `&mut dyn Runtime` so they can call back into
/// guest closures (`map`, `filter`, schema `where` conditions, and so on).
/// The VM implements this by re-entering its dispatch loop.
pub trait Runtime {
    fn call(&mut self, callee: &Value, args: Vec<Value>, named: Map) -> Result<Value, ErrorValue>;
}
