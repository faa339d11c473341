//! Collaborator interfaces: data store, blob store, auth service.
//!
//! The capture pipeline treats persistence and authentication as external
//! collaborators with fixed interfaces. Each is a small async trait so the
//! workflow can be driven against the production REST adapters
//! ([`supabase`]) or the in-memory implementations ([`memory`]) used by
//! tests, without the workflow knowing which it has.
//!
//! Atomicity expectations are the collaborator's: a receipt insert is a
//! single row write, a blob upload is a single object write, and the
//! budget upsert is delegated to the store's upsert-by-unique-key
//! primitive — concurrent saves for one `(user, category)` key must never
//! produce a second row.

use async_trait::async_trait;

use crate::error::CaptureError;
use crate::model::{
    Category, CategoryBudget, DateRange, NewReceipt, PersistedReceipt, ReceiptPatch,
};

pub mod memory;
pub mod supabase;

// ── Data store ───────────────────────────────────────────────────────────

/// Row CRUD for receipts and category budgets, scoped per user.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Insert exactly one receipt row. The store assigns `id` and
    /// `created_at`.
    async fn insert_receipt(&self, receipt: &NewReceipt)
        -> Result<PersistedReceipt, CaptureError>;

    /// List a user's receipts, newest first. When a range is given, the
    /// end bound is inclusive through the end of that day.
    async fn list_receipts(
        &self,
        user_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<PersistedReceipt>, CaptureError>;

    /// Apply a per-field edit to one receipt.
    async fn update_receipt(
        &self,
        id: &str,
        user_id: &str,
        patch: &ReceiptPatch,
    ) -> Result<PersistedReceipt, CaptureError>;

    /// Delete one receipt.
    async fn delete_receipt(&self, id: &str, user_id: &str) -> Result<(), CaptureError>;

    /// Insert-or-update the budget for `(user_id, category)`. At most one
    /// row per key, always holding the latest amount.
    async fn upsert_budget(
        &self,
        user_id: &str,
        category: Category,
        amount: f64,
    ) -> Result<CategoryBudget, CaptureError>;

    /// List a user's category budgets.
    async fn list_budgets(&self, user_id: &str) -> Result<Vec<CategoryBudget>, CaptureError>;
}

// ── Blob store ───────────────────────────────────────────────────────────

/// Write-once object upload with stable public URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `bytes` under the caller-supplied unique `name` and return
    /// the object's public URL.
    async fn upload(&self, name: &str, bytes: &[u8], mime: &str) -> Result<String, CaptureError>;
}

// ── Auth service ─────────────────────────────────────────────────────────

/// An authenticated session: the token to present on subsequent calls plus
/// the signed-in user.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

/// The signed-in user as the auth service reports it.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Sign-in/up/out and current-user lookup. Protocol internals are the
/// adapter's business; the rest of the crate only ever needs a user id.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, CaptureError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, CaptureError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), CaptureError>;

    async fn current_user(&self, access_token: &str) -> Result<AuthUser, CaptureError>;
}
