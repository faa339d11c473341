//! Parse and repair the structuring model's response into draft fields.
//!
//! The model's output is untrusted input. It usually honours the contract,
//! but every failure mode in the list below has been seen in the wild:
//! fenced output, truncated JSON, a prose apology instead of JSON, numbers
//! as strings, a category label not in the closed set, line items missing
//! quantities. None of these may abort the capture — the worst legitimate
//! outcome is an all-empty draft that the user fills in by hand during
//! review.
//!
//! So: normalise, try to parse, and on ANY failure fall back to defaults.
//! Field-level repair is defensive too — each field is picked
//! individually, so one malformed field never poisons its neighbours.

use serde_json::Value;
use tracing::debug;

use crate::model::{Category, LineItem};
use crate::normalize::{clean_json, normalize_date};

/// The repaired field set produced from one structuring response.
///
/// Exactly the draft-facing fields; everything defaults to its zero value
/// (`None` for the total, `Others` for the category).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub merchant_name: String,
    pub date: String,
    pub total_amount: Option<f64>,
    pub line_items: Vec<LineItem>,
    pub category: Category,
    pub notes: String,
}

/// Parse a raw structuring response into draft fields, repairing anything
/// malformed. Never fails.
///
/// A present `date` is re-rendered in canonical `YYYY-MM-DD` form when it
/// parses as a calendar date, and kept verbatim when it does not.
pub fn parse_extraction(raw: &str) -> ExtractedFields {
    let cleaned = clean_json(Some(raw));

    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => {
            debug!("extraction response is not valid JSON ({e}); using empty defaults");
            return ExtractedFields::default();
        }
    };

    ExtractedFields {
        merchant_name: string_field(&value, "merchant_name"),
        date: normalize_date(&string_field(&value, "date")),
        total_amount: number_field(&value, "total_amount"),
        line_items: line_items_field(&value),
        category: Category::from_label(&string_field(&value, "category")),
        notes: string_field(&value, "notes"),
    }
}

// ── Field repair helpers ─────────────────────────────────────────────────

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A number, or a string that parses as one. Anything else is `None` —
/// the review screen shows an empty amount rather than a fabricated zero.
fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Line items: a non-array (or absent) value yields an empty list; each
/// element repairs independently. Price and quantity fall back to 0 when
/// absent or non-numeric, and quantity is clamped to be non-negative.
fn line_items_field(value: &Value) -> Vec<LineItem> {
    let Some(items) = value.get("line_items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| LineItem {
            name: item
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            price: lenient_number(item.get("price")),
            quantity: lenient_number(item.get("quantity")).max(0.0),
        })
        .collect()
}

fn lenient_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
