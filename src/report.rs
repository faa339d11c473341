//! Dashboard derivations over stored receipts.
//!
//! Pure functions: the caller loads rows (and budgets) through the data
//! store, these routines fold them into the shapes the dashboard shows —
//! per-category spending against budgets, and a month-by-month expense
//! series. No I/O, no state, trivially testable.

use std::collections::BTreeMap;

use crate::model::{Category, CategoryBudget, PersistedReceipt};

/// One row of the category-spending view: what was spent against what was
/// budgeted.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLine {
    pub category: Category,
    pub spent: f64,
    /// The user's configured budget; 0 when none is set.
    pub budget: f64,
}

impl BudgetLine {
    /// Whether spending exceeds the configured budget. A zero budget is
    /// never "over" — there is nothing configured to exceed.
    pub fn is_over(&self) -> bool {
        self.budget > 0.0 && self.spent > self.budget
    }
}

/// Total spending per category. Receipts without a total contribute 0.
pub fn category_totals(receipts: &[PersistedReceipt]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for receipt in receipts {
        let entry = totals.entry(receipt.category.label().to_string()).or_insert(0.0);
        *entry += receipt.total_amount.unwrap_or(0.0);
    }
    totals
}

/// Merge spending and budgets into display rows, sorted by spending
/// descending. Categories appear when they have spending, a budget, or
/// both; silent categories are omitted.
pub fn budget_report(
    receipts: &[PersistedReceipt],
    budgets: &[CategoryBudget],
) -> Vec<BudgetLine> {
    let totals = category_totals(receipts);

    let mut lines: Vec<BudgetLine> = Category::ALL
        .into_iter()
        .filter_map(|category| {
            let spent = totals.get(category.label()).copied().unwrap_or(0.0);
            let budget = budgets
                .iter()
                .find(|b| b.category == category)
                .map(|b| b.budget_amount)
                .unwrap_or(0.0);
            if spent == 0.0 && budget == 0.0 {
                return None;
            }
            Some(BudgetLine {
                category,
                spent,
                budget,
            })
        })
        .collect();

    lines.sort_by(|a, b| b.spent.partial_cmp(&a.spent).unwrap_or(std::cmp::Ordering::Equal));
    lines
}

/// Month-by-month expense totals keyed by `YYYY-MM` of `created_at`,
/// in chronological order.
pub fn monthly_totals(receipts: &[PersistedReceipt]) -> Vec<(String, f64)> {
    let mut months: BTreeMap<String, f64> = BTreeMap::new();
    for receipt in receipts {
        let key = receipt.created_at.format("%Y-%m").to_string();
        *months.entry(key).or_insert(0.0) += receipt.total_amount.unwrap_or(0.0);
    }
    months.into_iter().collect()
}
