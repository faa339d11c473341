//! Record reconciliation: merge the machine-extracted draft with the
//! user's review edits into the shape that gets persisted.
//!
//! Two entry paths exist, and they treat the total differently on purpose:
//!
//! * **Scan path** — the user reviewed (and possibly edited) extracted
//!   fields, including the total. Whatever the field holds is what gets
//!   stored; a cleared field persists as no total.
//!
//! * **Manual path** — there never was an extracted total, so the stored
//!   total is always computed from the line items. A draft total, had one
//!   been typed, is ignored; the items are the source of truth.

use crate::model::{LineItem, NewReceipt, ReceiptDraft};

/// How the draft reached the commit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPath {
    /// Through the OCR/structuring pipeline and the review screen.
    Scan,
    /// Through manual entry; no OCR or structuring ever ran.
    Manual,
}

/// Sum of `quantity × price` over all line items.
///
/// Absent and non-numeric values were already repaired to 0 by the
/// extraction parser (or start at 0 for hand-added rows), so the sum never
/// fails; a NaN-poisoned product is treated as 0 rather than spreading.
pub fn line_items_total(items: &[LineItem]) -> f64 {
    items
        .iter()
        .map(|item| {
            let product = item.quantity * item.price;
            if product.is_finite() {
                product
            } else {
                0.0
            }
        })
        .sum()
}

/// Build the single row to insert for this draft.
pub fn reconcile(draft: &ReceiptDraft, user_id: &str, path: CommitPath) -> NewReceipt {
    let total_amount = match path {
        CommitPath::Scan => draft.total_amount,
        CommitPath::Manual => Some(line_items_total(&draft.line_items)),
    };

    NewReceipt {
        user_id: user_id.to_string(),
        image_url: draft.image_url.clone(),
        content: draft.ocr_text.clone(),
        merchant_name: draft.merchant_name.clone(),
        date: draft.date.clone(),
        total_amount,
        line_items: draft.line_items.clone(),
        category: draft.category,
        notes: draft.notes.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    fn manual_draft() -> ReceiptDraft {
        ReceiptDraft {
            merchant_name: "Corner Deli".into(),
            date: "2024-01-05".into(),
            category: Category::Food,
            line_items: vec![
                LineItem::new("Coffee", 15000.0, 2.0),
                LineItem::new("Bagel", 20000.0, 1.0),
            ],
            ..ReceiptDraft::default()
        }
    }

    #[test]
    fn manual_total_is_sum_of_items() {
        let row = reconcile(&manual_draft(), "u1", CommitPath::Manual);
        assert_eq!(row.total_amount, Some(50000.0));
    }

    #[test]
    fn manual_total_ignores_draft_total() {
        let mut draft = manual_draft();
        draft.total_amount = Some(999.0);
        let row = reconcile(&draft, "u1", CommitPath::Manual);
        assert_eq!(row.total_amount, Some(50000.0));
    }

    #[test]
    fn manual_total_with_no_items_is_zero() {
        let mut draft = manual_draft();
        draft.line_items.clear();
        let row = reconcile(&draft, "u1", CommitPath::Manual);
        assert_eq!(row.total_amount, Some(0.0));
    }

    #[test]
    fn scan_total_is_the_field() {
        let mut draft = manual_draft();
        draft.total_amount = Some(47500.0);
        let row = reconcile(&draft, "u1", CommitPath::Scan);
        assert_eq!(row.total_amount, Some(47500.0));
    }

    #[test]
    fn scan_cleared_total_stays_absent() {
        // The user blanked the amount in review; the row stores no total
        // rather than a recomputed one.
        let mut draft = manual_draft();
        draft.total_amount = None;
        let row = reconcile(&draft, "u1", CommitPath::Scan);
        assert_eq!(row.total_amount, None);
    }

    #[test]
    fn zero_quantity_items_contribute_nothing() {
        let items = vec![
            LineItem::new("Sticker", 5000.0, 0.0),
            LineItem::new("Pen", 3000.0, 2.0),
        ];
        assert_eq!(line_items_total(&items), 6000.0);
    }

    #[test]
    fn row_is_scoped_to_the_user() {
        let row = reconcile(&manual_draft(), "user-abc", CommitPath::Manual);
        assert_eq!(row.user_id, "user-abc");
    }

    #[test]
    fn ocr_text_rides_along_as_content() {
        let mut draft = manual_draft();
        draft.ocr_text = "KOPI 2x15.000".into();
        let row = reconcile(&draft, "u1", CommitPath::Scan);
        assert_eq!(row.content, "KOPI 2x15.000");
    }
}
