//! Remote cart storage.
//!
//! One record per authenticated user, looked up by `userId` equality (not by
//! record id). The record holds the full cart as a JSON-encoded string; every
//! write replaces that whole string rather than patching individual lines,
//! which sidesteps line-level conflict resolution at the cost of
//! last-writer-wins semantics across devices.
//!
//! Remote sync is best-effort by contract: callers treat every error here as
//! a soft failure and keep serving the local cart.

mod http;

pub use http::HttpRemoteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use copperleaf_core::{CartLine, RecordId, UserId, validate_and_dedupe};

/// The remote cart record, as stored by the backing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCartRecord {
    /// Record id assigned by the backing service.
    pub id: RecordId,
    /// Owning user. One record per user.
    pub user_id: UserId,
    /// The cart lines, JSON-encoded. Decode with [`decode_lines`].
    pub items_json: String,
}

/// Errors that can occur when talking to the remote cart service.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the remote service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Remote service returned a non-success status.
    #[error("Remote API error: HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        message: String,
    },
}

/// Access to the per-user remote cart record.
///
/// NotFound is an expected, non-exceptional outcome (`Ok(None)`); all other
/// failures surface as errors for the caller to log and swallow.
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Fetch the record owned by `user_id`, if one exists.
    async fn fetch_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<RemoteCartRecord>, RemoteStoreError>;

    /// Create a record for `user_id` holding the full line list.
    async fn create(
        &self,
        user_id: &UserId,
        lines: &[CartLine],
    ) -> Result<RemoteCartRecord, RemoteStoreError>;

    /// Replace the record's full line list.
    async fn update(
        &self,
        record_id: &RecordId,
        lines: &[CartLine],
    ) -> Result<RemoteCartRecord, RemoteStoreError>;
}

// =============================================================================
// Line Codec
// =============================================================================

/// Encode lines into the record's `itemsJson` payload.
#[must_use]
pub fn encode_lines(lines: &[CartLine]) -> String {
    // CartLine contains nothing a JSON serializer can reject.
    serde_json::to_string(lines).unwrap_or_else(|_| "[]".to_string())
}

/// Decode an `itemsJson` payload into validated lines.
///
/// Tolerant: malformed JSON or a non-array payload logs a warning and yields
/// an empty cart, and individual entries go through the validator.
#[must_use]
pub fn decode_lines(items_json: &str) -> Vec<CartLine> {
    let raw: serde_json::Value = match serde_json::from_str(items_json) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Malformed remote cart payload: {e}");
            return Vec::new();
        }
    };

    match raw.as_array() {
        Some(entries) => validate_and_dedupe(entries),
        None => {
            warn!("Remote cart payload is not an array; treating as empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copperleaf_core::ProductSnapshot;

    fn line(id: &str, quantity: u32) -> CartLine {
        CartLine::new(
            ProductSnapshot {
                id: id.to_string(),
                name: format!("Product {id}"),
                price: "12.00".parse().unwrap(),
                images: vec![],
            },
            quantity,
            "blue",
        )
    }

    #[test]
    fn test_codec_round_trip() {
        let lines = vec![line("p1", 2), line("p2", 1)];
        let decoded = decode_lines(&encode_lines(&lines));
        assert_eq!(decoded, lines);
    }

    #[test]
    fn test_decode_tolerates_garbage() {
        assert!(decode_lines("not json at all").is_empty());
        assert!(decode_lines("{\"an\": \"object\"}").is_empty());
        assert!(decode_lines("[{\"quantity\": 1}]").is_empty());
    }

    #[test]
    fn test_record_wire_shape() {
        let record = RemoteCartRecord {
            id: RecordId::new("rec_1"),
            user_id: UserId::new("usr_1"),
            items_json: "[]".to_string(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "rec_1");
        assert_eq!(value["userId"], "usr_1");
        assert_eq!(value["itemsJson"], "[]");
    }
}
