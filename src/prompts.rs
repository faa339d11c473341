//! Instruction prompts for the OCR and structuring calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the structuring contract (exact key
//!    set, category labels, number-not-currency-string rule) is stated in
//!    exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the contract without
//!    calling a real model, so a prompt regression that drops a key or a
//!    category label is caught immediately.

use crate::model::Category;

/// Instruction sent with the receipt image for plain-text OCR.
///
/// Deliberately minimal: anything beyond "all readable text, plain text
/// only" tempts the model into summarising, which loses the line items the
/// structuring pass needs.
pub const OCR_PROMPT: &str =
    "Extract all readable text from this image. Return plain text only.";

/// Build the structuring instruction for one receipt's OCR text.
///
/// The contract demands a single JSON object with an exact key set and a
/// closed category list. The model is told to best-guess missing fields
/// rather than omit them, and to emit `total_amount` as a bare number —
/// formatted currency strings are the single most common contract
/// violation otherwise.
pub fn extraction_prompt(ocr_text: &str) -> String {
    format!(
        r#"You are a JSON-only extractor. Extract receipt fields from the OCR text below.
Return ONLY valid JSON (no explanations). Use these keys exactly:
{{
  "merchant_name": string,
  "date": "YYYY-MM-DD",
  "total_amount": number,
  "line_items": [
    {{ "name": string, "price": number, "quantity": number }}
  ],
  "category": one of: {}
}}

OCR TEXT:
{}

If a value is not present exactly, make your best guess. Date must be in YYYY-MM-DD if possible. total_amount must be a number only."#,
        category_labels(),
        ocr_text
    )
}

/// The closed category list as it appears in the contract, quoted and
/// comma-separated.
fn category_labels() -> String {
    Category::ALL
        .iter()
        .map(|c| format!("\"{}\"", c.label()))
        .collect::<Vec<_>>()
        .join(", ")
}
