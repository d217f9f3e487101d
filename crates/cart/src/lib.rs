//! Copperleaf Cart - Cart synchronization engine.
//!
//! Keeps three tiers of cart state consistent: the authoritative in-memory
//! cart, a durable device-local copy, and a durable per-user remote copy.
//!
//! # Architecture
//!
//! - [`sync::CartSyncService`] owns the in-memory cart and orchestrates
//!   initial load/merge, debounced remote write-back, and identity
//!   transitions. Mutations are synchronous on memory, asynchronous on
//!   persistence.
//! - [`store`] - durable local slot (one fixed JSON file, device-wide)
//! - [`remote`] - per-user remote record access (trait + HTTP client)
//! - [`identity`] - identity boundary events (current value at subscribe,
//!   then every change)
//! - [`catalog`] - injectable TTL cache for catalog reads
//! - [`config`] - environment-driven configuration
//!
//! # Consistency model
//!
//! Every persisted write is a whole-state replace, so concurrent writers
//! settle on last-write-wins without locks. Remote sync is best-effort: a
//! failed sync never blocks or rolls back a local mutation.
//!
//! # Example
//!
//! ```rust,ignore
//! use copperleaf_cart::store::JsonFileStore;
//! use copperleaf_cart::sync::CartSyncService;
//!
//! let service = CartSyncService::local_only(
//!     Arc::new(JsonFileStore::new("cart.json")),
//!     ShippingPolicy::default(),
//!     Duration::from_millis(1000),
//! );
//! service.on_identity_change(None).await;
//! service.add_item(snapshot, 1, "blue")?;
//! let totals = service.totals();
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod remote;
pub mod store;
pub mod sync;

pub use config::{CartSyncConfig, ConfigError, RemoteStoreConfig};
pub use error::CartError;
pub use sync::CartSyncService;
