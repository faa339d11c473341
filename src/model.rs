//! Core data types for receipt capture and persistence.
//!
//! Two families of types live here:
//!
//! * **Transient** — [`ReceiptDraft`] and its parts, owned by the capture
//!   workflow while a receipt is being scanned, structured, and reviewed.
//!   A draft is never persisted directly.
//!
//! * **Persisted** — [`NewReceipt`] (the insert shape), [`PersistedReceipt`]
//!   (the stored row), [`ReceiptPatch`] (per-field edits), and
//!   [`CategoryBudget`]. These mirror the data-store schema exactly, so the
//!   REST adapters can serialise them without a mapping layer.
//!
//! Monetary amounts are `f64` throughout: the extractor emits JSON numbers,
//! the store holds a numeric column, and no arithmetic here needs more than
//! sum-of-products precision.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Category ─────────────────────────────────────────────────────────────

/// The closed set of spending categories the structuring contract allows.
///
/// The extractor is instructed to answer with one of exactly these labels;
/// anything else (or nothing) repairs to [`Category::Others`], which is also
/// the default for manual entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    Food,
    Transport,
    Shopping,
    Health,
    Entertainment,
    Bills,
    Groceries,
    #[default]
    Others,
}

impl Category {
    /// Every category, in the order the structuring prompt lists them.
    pub const ALL: [Category; 8] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Health,
        Category::Entertainment,
        Category::Bills,
        Category::Groceries,
        Category::Others,
    ];

    /// The wire label, exactly as the structuring contract spells it.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Shopping => "Shopping",
            Category::Health => "Health",
            Category::Entertainment => "Entertainment",
            Category::Bills => "Bills",
            Category::Groceries => "Groceries",
            Category::Others => "Others",
        }
    }

    /// Parse a label leniently: case-insensitive, unknown → `Others`.
    ///
    /// The extractor's output is untrusted; an off-contract label must not
    /// fail the pipeline, it must land in the catch-all bucket.
    pub fn from_label(label: &str) -> Category {
        let l = label.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(l))
            .unwrap_or(Category::Others)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Category::from_label(s))
    }
}

// ── Line items ───────────────────────────────────────────────────────────

/// One purchased item on a receipt.
///
/// `price` is the unit price; `quantity` is kept as a float because
/// receipts do sell 0.5 kg of produce. Repair guarantees `quantity >= 0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: f64,
}

impl LineItem {
    pub fn new(name: impl Into<String>, price: f64, quantity: f64) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }
}

// ── Image source ─────────────────────────────────────────────────────────

/// A receipt image selected by the user (camera or gallery), before upload.
#[derive(Debug, Clone)]
pub struct ImageSource {
    /// Raw image bytes as read from the camera or file picker.
    pub bytes: Vec<u8>,
    /// Original file name; kept so the blob object name stays recognisable.
    pub file_name: String,
    /// MIME type reported by the picker, e.g. `image/jpeg`.
    pub mime: String,
}

impl ImageSource {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime: mime.into(),
        }
    }
}

// ── The draft ────────────────────────────────────────────────────────────

/// The in-progress receipt during capture. Owned by the workflow; reset
/// wholesale when a new scan starts.
///
/// `date` stays a `String` on purpose: normalisation renders it as
/// `YYYY-MM-DD` when the extracted value parses as a calendar date, and
/// keeps the original text verbatim when it does not. The user sees and can
/// fix whatever the extractor produced; nothing is silently discarded.
#[derive(Debug, Clone, Default)]
pub struct ReceiptDraft {
    /// The selected image; `None` until the user picks one (and on the
    /// manual-entry path, where no image ever exists).
    pub image: Option<ImageSource>,
    /// Public URL assigned by the blob store once uploaded.
    pub image_url: Option<String>,
    /// Plain text from OCR. Empty string means "no text found" — valid.
    pub ocr_text: String,
    /// The structuring model's verbatim response, kept for the raw-data
    /// view and post-hoc debugging of bad extractions.
    pub raw_extraction: String,

    pub merchant_name: String,
    pub date: String,
    pub total_amount: Option<f64>,
    pub category: Category,
    pub notes: String,
    pub line_items: Vec<LineItem>,
}

impl ReceiptDraft {
    /// Discard everything derived from processing (OCR text, extraction,
    /// prefilled fields) but keep the selected image. Used by the
    /// review-screen "back" action so the user can re-process or re-pick.
    pub fn clear_extracted(&mut self) {
        let image = self.image.take();
        *self = ReceiptDraft {
            image,
            ..ReceiptDraft::default()
        };
    }
}

// ── Persisted shapes ─────────────────────────────────────────────────────

/// The insert payload for one receipt row. Produced exclusively by the
/// reconciler; the data store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReceipt {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Raw OCR text. The column is named `content` in the store schema.
    #[serde(default)]
    pub content: String,
    pub merchant_name: String,
    pub date: String,
    pub total_amount: Option<f64>,
    pub line_items: Vec<LineItem>,
    pub category: Category,
    #[serde(default)]
    pub notes: String,
}

/// One stored receipt row, scoped to its owning user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedReceipt {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub merchant_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// A partial update to a stored receipt. Every field is independently
/// editable; `None` means "leave unchanged".
///
/// `total_amount` is doubly optional: `Some(None)` clears the stored total,
/// `None` leaves it alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiptPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_items: Option<Vec<LineItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ReceiptPatch {
    pub fn is_empty(&self) -> bool {
        self.merchant_name.is_none()
            && self.date.is_none()
            && self.total_amount.is_none()
            && self.line_items.is_none()
            && self.category.is_none()
            && self.notes.is_none()
    }
}

/// A per-user spending ceiling for one category. Unique on
/// `(user_id, category)`; saves are upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBudget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub category: Category,
    pub budget_amount: f64,
}

// ── Date range filter ────────────────────────────────────────────────────

/// An optional start/end filter for receipt listings.
///
/// The end bound is inclusive through the whole end day: a receipt created
/// at 18:00 on the end date is inside the range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Whether the given instant falls inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        if let Some(start) = self.start {
            if day < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if day > end {
                return false;
            }
        }
        true
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
