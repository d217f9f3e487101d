//! Durable local cart storage.
//!
//! The local store is one fixed slot holding "the last cart seen on this
//! device". It is deliberately not per-user: a guest cart lives here, and it
//! survives sign-in/sign-out so the device keeps its cart across identity
//! boundaries.
//!
//! Loads are infallible by contract - missing or corrupt content yields an
//! empty cart, because storage corruption must never crash the caller.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use copperleaf_core::CartLine;
use thiserror::Error;

/// Errors that can occur when writing the local slot.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cart serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable key-value access to the device-local cart slot.
pub trait LocalCartStore: Send + Sync {
    /// Overwrite the slot with the full serialized cart.
    ///
    /// # Errors
    ///
    /// Returns `LocalStoreError` if the write fails. Callers log and
    /// continue; the in-memory cart stays authoritative.
    fn save(&self, lines: &[CartLine]) -> Result<(), LocalStoreError>;

    /// Read the slot, returning validated and deduplicated lines.
    ///
    /// Never fails: missing or corrupt content logs a warning and returns
    /// an empty cart.
    fn load(&self) -> Vec<CartLine>;
}
