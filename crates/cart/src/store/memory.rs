//! In-process local cart store.

use std::sync::Mutex;

use copperleaf_core::{CartLine, dedupe_lines};

use super::{LocalCartStore, LocalStoreError};

/// Local cart slot held in process memory.
///
/// Used by tests and by embedders that have no durable device storage
/// (e.g. server-side rendering, where each instance gets its own slot).
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Vec<CartLine>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with lines, as if a previous session had
    /// saved them.
    #[must_use]
    pub fn seeded(lines: Vec<CartLine>) -> Self {
        Self {
            slot: Mutex::new(lines),
        }
    }
}

impl LocalCartStore for MemoryStore {
    fn save(&self, lines: &[CartLine]) -> Result<(), LocalStoreError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = lines.to_vec();
        Ok(())
    }

    fn load(&self) -> Vec<CartLine> {
        dedupe_lines(
            self.slot
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone(),
        )
    }
}
