//! HTTP client for the remote cart collection.
//!
//! Talks to the backing records API: one logical "carts" collection queried
//! by owner equality. Uses `reqwest` with an API key header; responses are
//! read as text first so failures can be logged with a body snippet.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::instrument;

use copperleaf_core::{CartLine, RecordId, UserId};

use crate::config::RemoteStoreConfig;

use super::{RemoteCartRecord, RemoteCartStore, RemoteStoreError, encode_lines};

/// Client for the remote cart records API.
///
/// Cheaply cloneable; all clones share one HTTP connection pool.
#[derive(Clone)]
pub struct HttpRemoteStore {
    inner: Arc<HttpRemoteStoreInner>,
}

struct HttpRemoteStoreInner {
    client: reqwest::Client,
    collection_url: String,
    api_key: String,
}

/// List response from the records API.
#[derive(Debug, Deserialize)]
struct RecordList {
    records: Vec<RemoteCartRecord>,
}

/// Create body: the service assigns the record id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecord<'a> {
    user_id: &'a UserId,
    items_json: String,
}

/// Update body: whole-state replace of the line list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceItems {
    items_json: String,
}

impl HttpRemoteStore {
    /// Create a new remote store client.
    #[must_use]
    pub fn new(config: &RemoteStoreConfig) -> Self {
        let collection_url = format!(
            "{}/v1/collections/{}/records",
            config.endpoint.as_str().trim_end_matches('/'),
            config.collection
        );

        Self {
            inner: Arc::new(HttpRemoteStoreInner {
                client: reqwest::Client::new(),
                collection_url,
                api_key: config.api_key.expose_secret().to_string(),
            }),
        }
    }

    /// Send a request and decode the response.
    ///
    /// 404 maps to `Ok(None)` so callers can treat missing records as the
    /// expected outcome they are.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, RemoteStoreError> {
        let response = request
            .header("X-Api-Key", &self.inner.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteStoreError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Remote cart API returned non-success status"
            );
            return Err(RemoteStoreError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        match serde_json::from_str(&body) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %body.chars().take(500).collect::<String>(),
                    "Failed to parse remote cart API response"
                );
                Err(RemoteStoreError::Parse(e))
            }
        }
    }
}

#[async_trait]
impl RemoteCartStore for HttpRemoteStore {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<RemoteCartRecord>, RemoteStoreError> {
        let request = self
            .inner
            .client
            .get(&self.inner.collection_url)
            .query(&[("userId", user_id.as_str())]);

        let list: Option<RecordList> = self.execute(request).await?;
        Ok(list.and_then(|l| l.records.into_iter().next()))
    }

    #[instrument(skip(self, lines), fields(user_id = %user_id, line_count = lines.len()))]
    async fn create(
        &self,
        user_id: &UserId,
        lines: &[CartLine],
    ) -> Result<RemoteCartRecord, RemoteStoreError> {
        let request = self
            .inner
            .client
            .post(&self.inner.collection_url)
            .json(&CreateRecord {
                user_id,
                items_json: encode_lines(lines),
            });

        self.execute(request).await?.ok_or(RemoteStoreError::Api {
            status: 404,
            message: "record collection not found".to_string(),
        })
    }

    #[instrument(skip(self, lines), fields(record_id = %record_id, line_count = lines.len()))]
    async fn update(
        &self,
        record_id: &RecordId,
        lines: &[CartLine],
    ) -> Result<RemoteCartRecord, RemoteStoreError> {
        let url = format!("{}/{record_id}", self.inner.collection_url);
        let request = self.inner.client.patch(&url).json(&ReplaceItems {
            items_json: encode_lines(lines),
        });

        self.execute(request).await?.ok_or(RemoteStoreError::Api {
            status: 404,
            message: format!("record not found: {record_id}"),
        })
    }
}
