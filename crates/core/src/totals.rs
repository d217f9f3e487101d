//! Cart totals computation.
//!
//! Pure functions over validated lines. Totals are derived on every read,
//! never stored: the computation is O(n) in line count and callers hold the
//! cart anyway.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::CartLine;

/// Shipping cost policy applied to a cart subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Flat shipping cost below the threshold.
    pub shipping_cost: Decimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(100, 0),
            shipping_cost: Decimal::new(10, 0),
        }
    }
}

/// Computed cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    /// Sum of price × quantity over all lines.
    pub subtotal: Decimal,
    /// Zero at or above the free-shipping threshold, else the flat cost.
    pub shipping: Decimal,
    /// Subtotal plus shipping.
    pub total: Decimal,
}

/// Compute subtotal, shipping, and total for a cart.
#[must_use]
pub fn compute_totals(lines: &[CartLine], policy: &ShippingPolicy) -> CartTotals {
    let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();

    let shipping = if subtotal >= policy.free_shipping_threshold {
        Decimal::ZERO
    } else {
        policy.shipping_cost
    };

    CartTotals {
        subtotal,
        shipping,
        total: subtotal + shipping,
    }
}

/// Total number of units across all lines.
#[must_use]
pub fn item_count(lines: &[CartLine]) -> u32 {
    lines
        .iter()
        .fold(0u32, |count, line| count.saturating_add(line.quantity))
}
