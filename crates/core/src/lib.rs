//! Copperleaf Core - Shared cart domain types.
//!
//! This crate provides the cart domain model used across all Copperleaf
//! components:
//! - `cart` - Cart synchronization engine (local/remote persistence)
//! - `integration-tests` - Cross-crate scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. This keeps it lightweight and allows it to be used
//! anywhere, including inside the synchronizer's state lock.
//!
//! # Modules
//!
//! - [`types`] - Cart lines, product snapshots, and newtype IDs
//! - [`validate`] - Validation and deduplication of raw persisted data
//! - [`totals`] - Subtotal/shipping/total computation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod totals;
pub mod types;
pub mod validate;

pub use totals::{CartTotals, ShippingPolicy, compute_totals, item_count};
pub use types::*;
pub use validate::{dedupe_lines, validate_and_dedupe};
