//! Core types for the Copperleaf cart.
//!
//! This module provides the persisted cart shapes and type-safe ID wrappers.

pub mod id;
pub mod line;

pub use id::*;
pub use line::{CartLine, DEFAULT_COLOR, LineKey, ProductSnapshot};
