//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CART_LOCAL_PATH` - Local cart slot path (default: cart.json)
//! - `CART_DEBOUNCE_MS` - Remote flush debounce in milliseconds (default: 1000)
//! - `CART_FREE_SHIPPING_THRESHOLD` - Subtotal for free shipping (default: 100)
//! - `CART_SHIPPING_COST` - Flat shipping cost below the threshold (default: 10)
//! - `CATALOG_CACHE_TTL_SECS` - Catalog cache TTL (default: 300)
//! - `CATALOG_CACHE_CAPACITY` - Catalog cache entry capacity (default: 1000)
//!
//! ## Remote store (all-or-nothing; engine stays device-local when unset)
//! - `CART_REMOTE_ENDPOINT` - Base URL of the records API
//! - `CART_REMOTE_API_KEY` - API key (required once the endpoint is set)
//! - `CART_REMOTE_COLLECTION` - Records collection name (default: carts)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use copperleaf_core::ShippingPolicy;

const DEFAULT_LOCAL_PATH: &str = "cart.json";
const DEFAULT_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_CATALOG_TTL_SECS: u64 = 300;
const DEFAULT_CATALOG_CAPACITY: u64 = 1000;
const DEFAULT_COLLECTION: &str = "carts";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartSyncConfig {
    /// Local cart slot path.
    pub local_path: PathBuf,
    /// Quiet period before a remote flush fires.
    pub debounce: Duration,
    /// Shipping cost policy for totals.
    pub shipping: ShippingPolicy,
    /// Catalog cache TTL.
    pub catalog_ttl: Duration,
    /// Catalog cache entry capacity.
    pub catalog_capacity: u64,
    /// Remote store configuration; `None` keeps the engine device-local.
    pub remote: Option<RemoteStoreConfig>,
}

/// Remote cart records API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct RemoteStoreConfig {
    /// Base URL of the records API.
    pub endpoint: Url,
    /// API key sent with every request.
    pub api_key: SecretString,
    /// Records collection holding one cart per user.
    pub collection: String,
}

impl std::fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStoreConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .field("collection", &self.collection)
            .finish()
    }
}

impl CartSyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a set variable fails to parse, or if the
    /// remote endpoint is set without its API key.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let local_path = PathBuf::from(get_env_or_default("CART_LOCAL_PATH", DEFAULT_LOCAL_PATH));

        let debounce_ms = parse_env("CART_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        let catalog_ttl_secs = parse_env("CATALOG_CACHE_TTL_SECS", DEFAULT_CATALOG_TTL_SECS)?;
        let catalog_capacity = parse_env("CATALOG_CACHE_CAPACITY", DEFAULT_CATALOG_CAPACITY)?;

        let default_policy = ShippingPolicy::default();
        let shipping = ShippingPolicy {
            free_shipping_threshold: parse_env(
                "CART_FREE_SHIPPING_THRESHOLD",
                default_policy.free_shipping_threshold,
            )?,
            shipping_cost: parse_env("CART_SHIPPING_COST", default_policy.shipping_cost)?,
        };

        Ok(Self {
            local_path,
            debounce: Duration::from_millis(debounce_ms),
            shipping,
            catalog_ttl: Duration::from_secs(catalog_ttl_secs),
            catalog_capacity,
            remote: RemoteStoreConfig::from_env()?,
        })
    }
}

impl RemoteStoreConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(endpoint) = get_optional_env("CART_REMOTE_ENDPOINT") else {
            return Ok(None);
        };

        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidEnvVar("CART_REMOTE_ENDPOINT".to_string(), e.to_string())
        })?;

        let api_key = get_required_env("CART_REMOTE_API_KEY")?;

        Ok(Some(Self {
            endpoint,
            api_key: SecretString::from(api_key),
            collection: get_env_or_default("CART_REMOTE_COLLECTION", DEFAULT_COLLECTION),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to a default when unset.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(&raw, key),
        Err(_) => Ok(default),
    }
}

/// Parse a raw variable value, naming the variable in the error.
fn parse_value<T>(raw: &str, key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
