//! Kenpali standard library.
//!
//! Natives are implemented in Rust and referenced from compiled programs by
//! name; the rest are Kenpali source trees compiled on demand.

mod natives;
pub mod source;

use kenpali_common::{Library, PlatformResolver, Value};
use tracing::trace;

pub use natives::natives;

/// The default library: every native followed by every source builtin.
pub fn standard_library() -> Library {
    let mut library = Library::new();
    for (name, value) in natives() {
        library.define_value(name, value);
    }
    for (name, expr) in source::definitions() {
        library.define_source(name, expr);
    }
    trace!(definitions = library.len(), "built standard library");
    library
}

/// Look up a native builtin by name.
pub fn builtin(name: &str) -> Option<Value> {
    natives()
        .into_iter()
        .find(|(n, _)| *n == name)
        .map(|(_, value)| value)
}

/// Resolves the platform values of decoded programs against the natives.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPlatform;

impl PlatformResolver for StandardPlatform {
    fn resolve(&self, name: &str) -> Option<Value> {
        builtin(name)
    }
}
