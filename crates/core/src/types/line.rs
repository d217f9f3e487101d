//! Cart line and product snapshot types.
//!
//! These are the persisted shapes: the same JSON layout is written to the
//! local store slot and into the remote record's `itemsJson` field, so field
//! names stay camelCase on the wire.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sentinel color for lines added without an explicit variant color.
pub const DEFAULT_COLOR: &str = "Default";

/// The product data captured at the moment a line is added.
///
/// A snapshot, not a live reference: later catalog edits (price changes,
/// renames) do not retroactively change what the cart displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    /// Catalog product ID.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Unit price. Always finite and non-negative once validated.
    pub price: Decimal,
    /// Image URLs.
    #[serde(default)]
    pub images: Vec<String>,
}

/// One product-variant-quantity entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Catalog product ID. Matches `product.id` for lines we created;
    /// legacy persisted lines may only carry the snapshot's id.
    pub product_id: String,
    /// Product data captured when the line was added.
    #[serde(rename = "productSnapshot")]
    pub product: ProductSnapshot,
    /// Always `>= 1`; a mutation requesting less removes the line instead.
    pub quantity: u32,
    /// Variant color, `"Default"` when the product has no color choice.
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// The `(product, color)` pair that decides whether two lines are the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub product_id: String,
    pub color: String,
}

impl CartLine {
    /// Create a line from a snapshot, defaulting the color sentinel.
    #[must_use]
    pub fn new(product: ProductSnapshot, quantity: u32, color: &str) -> Self {
        let color = if color.trim().is_empty() {
            DEFAULT_COLOR.to_string()
        } else {
            color.to_string()
        };
        Self {
            product_id: product.id.clone(),
            product,
            quantity,
            color,
        }
    }

    /// Identity key for uniqueness and merging.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            color: self.color.clone(),
        }
    }

    /// Price × quantity for this line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, price: &str) -> ProductSnapshot {
        ProductSnapshot {
            id: id.to_string(),
            name: format!("Product {id}"),
            price: price.parse().unwrap(),
            images: vec![],
        }
    }

    #[test]
    fn test_new_defaults_blank_color() {
        let line = CartLine::new(snapshot("p1", "5.00"), 2, "  ");
        assert_eq!(line.color, DEFAULT_COLOR);
        assert_eq!(line.product_id, "p1");
    }

    #[test]
    fn test_key_distinguishes_colors() {
        let red = CartLine::new(snapshot("p1", "5.00"), 1, "red");
        let blue = CartLine::new(snapshot("p1", "5.00"), 1, "blue");
        assert_ne!(red.key(), blue.key());
        assert_eq!(red.key(), red.clone().key());
    }

    #[test]
    fn test_serializes_camel_case() {
        let line = CartLine::new(snapshot("p1", "19.99"), 3, "red");
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(value["productId"], "p1");
        assert_eq!(value["productSnapshot"]["id"], "p1");
        assert_eq!(value["quantity"], 3);
        assert_eq!(value["color"], "red");
    }

    #[test]
    fn test_line_total() {
        let line = CartLine::new(snapshot("p1", "19.99"), 3, "red");
        assert_eq!(line.line_total(), "59.97".parse().unwrap());
    }
}
