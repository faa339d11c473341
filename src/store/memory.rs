//! In-memory collaborator implementations.
//!
//! Used by the unit and integration tests, and handy for driving the
//! workflow in examples without network credentials. Semantics mirror the
//! production adapters: server-assigned ids and timestamps, newest-first
//! listing with an end-of-day-inclusive end bound, and at most one budget
//! row per `(user, category)` key.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::CaptureError;
use crate::model::{
    Category, CategoryBudget, DateRange, NewReceipt, PersistedReceipt, ReceiptPatch,
};
use crate::store::{BlobStore, DataStore};

/// In-memory receipt and budget rows behind a mutex.
#[derive(Default)]
pub struct MemoryDataStore {
    receipts: Mutex<Vec<PersistedReceipt>>,
    budgets: Mutex<Vec<CategoryBudget>>,
    next_id: AtomicU64,
    /// When set, every row operation fails with this message. Lets tests
    /// exercise the surfaced-error paths.
    fail_with: Mutex<Option<String>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }

    /// Clear a previously injected failure.
    pub fn heal(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    fn check_failure(&self, operation: &'static str) -> Result<(), CaptureError> {
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            return Err(CaptureError::DataStore {
                operation,
                detail: msg,
            });
        }
        Ok(())
    }

    fn assign_id(&self) -> String {
        format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn insert_receipt(
        &self,
        receipt: &NewReceipt,
    ) -> Result<PersistedReceipt, CaptureError> {
        self.check_failure("insert")?;
        let row = PersistedReceipt {
            id: self.assign_id(),
            user_id: receipt.user_id.clone(),
            image_url: receipt.image_url.clone(),
            content: receipt.content.clone(),
            merchant_name: receipt.merchant_name.clone(),
            date: receipt.date.clone(),
            total_amount: receipt.total_amount,
            line_items: receipt.line_items.clone(),
            category: receipt.category,
            notes: receipt.notes.clone(),
            created_at: Utc::now(),
        };
        self.receipts.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_receipts(
        &self,
        user_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<PersistedReceipt>, CaptureError> {
        self.check_failure("list")?;
        let mut rows: Vec<PersistedReceipt> = self
            .receipts
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| range.map_or(true, |range| range.contains(r.created_at)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_receipt(
        &self,
        id: &str,
        user_id: &str,
        patch: &ReceiptPatch,
    ) -> Result<PersistedReceipt, CaptureError> {
        self.check_failure("update")?;
        let mut rows = self.receipts.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id && r.user_id == user_id)
            .ok_or_else(|| CaptureError::DataStore {
                operation: "update",
                detail: format!("no receipt '{id}' for this user"),
            })?;

        if let Some(v) = &patch.merchant_name {
            row.merchant_name = v.clone();
        }
        if let Some(v) = &patch.date {
            row.date = v.clone();
        }
        if let Some(v) = patch.total_amount {
            row.total_amount = v;
        }
        if let Some(v) = &patch.line_items {
            row.line_items = v.clone();
        }
        if let Some(v) = patch.category {
            row.category = v;
        }
        if let Some(v) = &patch.notes {
            row.notes = v.clone();
        }
        Ok(row.clone())
    }

    async fn delete_receipt(&self, id: &str, user_id: &str) -> Result<(), CaptureError> {
        self.check_failure("delete")?;
        let mut rows = self.receipts.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.id == id && r.user_id == user_id));
        if rows.len() == before {
            return Err(CaptureError::DataStore {
                operation: "delete",
                detail: format!("no receipt '{id}' for this user"),
            });
        }
        Ok(())
    }

    async fn upsert_budget(
        &self,
        user_id: &str,
        category: Category,
        amount: f64,
    ) -> Result<CategoryBudget, CaptureError> {
        self.check_failure("upsert")?;
        let mut budgets = self.budgets.lock().unwrap();
        if let Some(existing) = budgets
            .iter_mut()
            .find(|b| b.user_id == user_id && b.category == category)
        {
            existing.budget_amount = amount;
            return Ok(existing.clone());
        }
        let row = CategoryBudget {
            id: Some(self.assign_id()),
            user_id: user_id.to_string(),
            category,
            budget_amount: amount,
        };
        budgets.push(row.clone());
        Ok(row)
    }

    async fn list_budgets(&self, user_id: &str) -> Result<Vec<CategoryBudget>, CaptureError> {
        self.check_failure("list")?;
        Ok(self
            .budgets
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// In-memory blob store: remembers uploads, hands out fake public URLs.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<(String, usize)>>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }

    /// Names of every object uploaded so far, in order.
    pub fn object_names(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, name: &str, bytes: &[u8], _mime: &str) -> Result<String, CaptureError> {
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            return Err(CaptureError::UploadFailed {
                name: name.to_string(),
                detail: msg,
            });
        }
        self.objects
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.len()));
        Ok(format!("memory://receipts/{name}"))
    }
}
