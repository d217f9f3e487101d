//! File-backed local cart store.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use copperleaf_core::{CartLine, validate_and_dedupe};

use super::{LocalCartStore, LocalStoreError};

/// Local cart slot backed by a single JSON file.
///
/// The file path is the "fixed key": one slot per device, shared by every
/// process pointing at the same path (last-write-wins, an accepted
/// limitation). Writes go through a temp file and rename so a crash
/// mid-write cannot leave a half-written slot.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store for the given slot path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The slot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalCartStore for JsonFileStore {
    fn save(&self, lines: &[CartLine]) -> Result<(), LocalStoreError> {
        let json = serde_json::to_string(lines)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Vec<CartLine> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read local cart slot {}: {e}", self.path.display());
                return Vec::new();
            }
        };

        let raw: Value = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Corrupt local cart slot {}: {e}", self.path.display());
                return Vec::new();
            }
        };

        match raw.as_array() {
            Some(entries) => validate_and_dedupe(entries),
            None => {
                warn!(
                    "Local cart slot {} does not hold an array; resetting",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }
}
