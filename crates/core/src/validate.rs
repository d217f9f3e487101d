//! Validation and deduplication of raw cart data.
//!
//! Persisted carts arrive from the local store slot or the remote record as
//! arbitrary JSON: older app versions wrote slightly different shapes, and
//! either tier can hold truncated or hand-edited content. This module is the
//! single chokepoint that turns that input into well-formed [`CartLine`]s.
//!
//! Filtering, not throwing: invalid entries are dropped, never raised as
//! errors. Storage corruption must never crash the caller.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;

use crate::types::{CartLine, DEFAULT_COLOR, LineKey, ProductSnapshot};

/// Validate a raw decoded sequence and merge duplicate lines.
///
/// A candidate is valid iff it has a non-empty product id (`productId`, or
/// the snapshot's `id` for legacy shapes), a snapshot price that decodes to
/// a finite non-negative decimal, and an integer quantity `>= 1`. Invalid
/// entries are dropped. Valid lines sharing a `(productId, color)` key are
/// merged by summing quantities; the first-seen line's snapshot wins, and
/// output keeps first-seen order.
///
/// Pure and idempotent: running the output back through yields the same
/// result.
#[must_use]
pub fn validate_and_dedupe(raw: &[Value]) -> Vec<CartLine> {
    merge_lines(raw.iter().filter_map(decode_line))
}

/// Re-run the validation invariants over already-typed lines.
///
/// Used as the defensive re-check before any persistence: typed lines can
/// still carry duplicate keys or out-of-range values if a caller assembled
/// them by hand.
#[must_use]
pub fn dedupe_lines(lines: Vec<CartLine>) -> Vec<CartLine> {
    merge_lines(
        lines
            .into_iter()
            .filter(|line| line.quantity >= 1 && line.product.price >= Decimal::ZERO),
    )
}

fn merge_lines(lines: impl Iterator<Item = CartLine>) -> Vec<CartLine> {
    let mut order: Vec<LineKey> = Vec::new();
    let mut merged: HashMap<LineKey, CartLine> = HashMap::new();

    for line in lines {
        let key = line.key();
        match merged.get_mut(&key) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            }
            None => {
                order.push(key.clone());
                merged.insert(key, line);
            }
        }
    }

    order.into_iter().filter_map(|key| merged.remove(&key)).collect()
}

// =============================================================================
// Field Decoding
// =============================================================================

/// Decode one raw entry, or `None` if it fails validation.
fn decode_line(value: &Value) -> Option<CartLine> {
    let object = value.as_object()?;
    let snapshot = object.get("productSnapshot")?.as_object()?;

    // Legacy shapes may carry the id only on the snapshot.
    let product_id = non_empty_str(object.get("productId"))
        .or_else(|| non_empty_str(snapshot.get("id")))?;

    let price = decode_price(snapshot.get("price")?)?;
    let quantity = decode_quantity(object.get("quantity")?)?;

    let color = non_empty_str(object.get("color")).unwrap_or_else(|| DEFAULT_COLOR.to_string());

    let name = snapshot
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let images = snapshot
        .get("images")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let snapshot_id = non_empty_str(snapshot.get("id")).unwrap_or_else(|| product_id.clone());

    Some(CartLine {
        product_id,
        product: ProductSnapshot {
            id: snapshot_id,
            name,
            price,
            images,
        },
        quantity,
        color,
    })
}

/// Decode a price from a JSON number, or a numeric string (legacy shape).
///
/// Rejects negatives; JSON cannot encode NaN/infinity, and string parsing
/// only yields finite decimals.
fn decode_price(value: &Value) -> Option<Decimal> {
    let price = match value {
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                Decimal::from(int)
            } else {
                Decimal::from_f64(n.as_f64()?)?
            }
        }
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };

    (price >= Decimal::ZERO).then_some(price)
}

/// Decode a quantity: a JSON integer `>= 1`. Non-integers are rejected, not
/// rounded.
fn decode_quantity(value: &Value) -> Option<u32> {
    let quantity = u32::try_from(value.as_u64()?).ok()?;
    (quantity >= 1).then_some(quantity)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}
