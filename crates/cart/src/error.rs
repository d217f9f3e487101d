//! Mutation-boundary errors.
//!
//! The cart API rejects invalid arguments up front with no partial mutation.
//! Persistence failures are deliberately NOT represented here: by design no
//! sync failure blocks a mutation that already succeeded in memory.

use thiserror::Error;

/// Errors returned by the cart mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The product snapshot has no id.
    #[error("Product is missing an id")]
    MissingProductId,

    /// The requested quantity is not usable for this operation.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),
}
