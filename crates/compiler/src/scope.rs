//! Compile-time lexical scopes.
//!
//! Every scope maps one-to-one onto a scope frame the VM pushes at run
//! time, so the distance between two scopes on the compiler's stack is the
//! frame depth operand of `READ_LOCAL` / `WRITE_LOCAL` / `CLOSURE`.

use std::collections::BTreeSet;

use indexmap::IndexMap;

/// Slots 0..3 of a function scope hold the callee, the positional argument
/// array and the named argument object.
pub(crate) const CALL_SLOTS: u32 = 3;

#[derive(Debug, Default)]
pub(crate) struct CompiledScope {
    names: IndexMap<String, u32>,
    captured: BTreeSet<u32>,
    first_slot: u32,
    next_slot: u32,
    /// The scope holds the retained library definitions.
    pub library: bool,
}

impl CompiledScope {
    /// A defining or catching block.
    pub fn block() -> Self {
        Self::default()
    }

    pub fn function() -> Self {
        Self {
            first_slot: CALL_SLOTS,
            next_slot: CALL_SLOTS,
            ..Self::default()
        }
    }

    pub fn library() -> Self {
        Self {
            library: true,
            ..Self::default()
        }
    }

    /// Declare `name` in a fresh slot. A repeated name rebinds to the new slot.
    pub fn declare(&mut self, name: &str) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.names.insert(name.to_string(), slot);
        slot
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    /// Mark a slot as referenced from an inner function.
    pub fn capture(&mut self, slot: u32) {
        self.captured.insert(slot);
    }

    /// Captured slots in reverse declaration order.
    pub fn captured_rev(&self) -> Vec<u32> {
        self.captured.iter().rev().copied().collect()
    }

    /// Number of uninitialized slots the scope reserves.
    pub fn reserved(&self) -> u32 {
        self.next_slot - self.first_slot
    }
}
