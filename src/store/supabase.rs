//! Supabase-compatible REST adapters for the three collaborators.
//!
//! One [`SupabaseClient`] implements all three traits against the three
//! REST surfaces of a Supabase project:
//!
//! * `rest/v1`    — PostgREST row CRUD (`receipts`, `category_budgets`)
//! * `storage/v1` — object upload + stable public URLs
//! * `auth/v1`    — GoTrue password-grant sign-in/up/out
//!
//! The adapters are deliberately boring: build the request, check the
//! status, attach the upstream body to the error. Atomicity comes from the
//! server — a row insert is one statement, and the budget upsert rides on
//! PostgREST's `on_conflict` + `resolution=merge-duplicates`, which is the
//! unique-key upsert primitive the schema's `(user_id, category)`
//! constraint exists for.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::json;
use tracing::debug;

use crate::error::CaptureError;
use crate::model::{
    Category, CategoryBudget, DateRange, NewReceipt, PersistedReceipt, ReceiptPatch,
};
use crate::store::{AuthService, AuthSession, AuthUser, BlobStore, DataStore};

/// Default storage bucket for receipt images.
const DEFAULT_BUCKET: &str = "receipts";

/// HTTP timeout for all store calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A configured client for one Supabase project.
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    api_key: String,
    /// User access token for row-level-security scoping; the API key is
    /// used as the bearer until a user signs in.
    access_token: Option<String>,
    bucket: String,
}

impl SupabaseClient {
    /// Create a client for the project at `base_url` (no trailing slash
    /// needed) using its anon/service `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, CaptureError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CaptureError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
            bucket: DEFAULT_BUCKET.to_string(),
        })
    }

    /// Scope subsequent requests to a signed-in user's token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Use a different storage bucket than the default `receipts`.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        if let Ok(v) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {bearer}")) {
            headers.insert(AUTHORIZATION, v);
        }
        headers
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// The stable public URL for an object in the configured bucket.
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, name
        )
    }
}

/// Turn a non-success response into the upstream error message.
///
/// PostgREST and GoTrue both answer with JSON error bodies; fall back to
/// the raw text (or the bare status) when the body isn't one.
async fn upstream_error(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&body) {
        for key in ["message", "error", "msg", "error_description"] {
            if let Some(msg) = v.get(key).and_then(|m| m.as_str()) {
                return format!("{status}: {msg}");
            }
        }
    }
    if body.is_empty() {
        format!("{status}")
    } else {
        format!("{status}: {body}")
    }
}

/// PostgREST's end bound for an end-of-day-inclusive date filter.
fn end_of_day_param(range_end: chrono::NaiveDate) -> String {
    format!("lte.{}T23:59:59", range_end.format("%Y-%m-%d"))
}

// ── DataStore ────────────────────────────────────────────────────────────

#[async_trait]
impl DataStore for SupabaseClient {
    async fn insert_receipt(
        &self,
        receipt: &NewReceipt,
    ) -> Result<PersistedReceipt, CaptureError> {
        let response = self
            .http
            .post(self.rest_url("receipts"))
            .headers(self.headers())
            .header("Prefer", "return=representation")
            .json(receipt)
            .send()
            .await
            .map_err(|e| CaptureError::DataStore {
                operation: "insert",
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::DataStore {
                operation: "insert",
                detail: upstream_error(response).await,
            });
        }

        // PostgREST returns the representation as a one-row array.
        let mut rows: Vec<PersistedReceipt> =
            response.json().await.map_err(|e| CaptureError::DataStore {
                operation: "insert",
                detail: format!("unexpected response shape: {e}"),
            })?;
        rows.pop().ok_or_else(|| CaptureError::DataStore {
            operation: "insert",
            detail: "empty representation returned".into(),
        })
    }

    async fn list_receipts(
        &self,
        user_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<PersistedReceipt>, CaptureError> {
        let mut query: Vec<(String, String)> = vec![
            ("select".into(), "*".into()),
            ("user_id".into(), format!("eq.{user_id}")),
            ("order".into(), "created_at.desc".into()),
        ];
        if let Some(range) = range {
            if let Some(start) = range.start {
                query.push(("created_at".into(), format!("gte.{}", start.format("%Y-%m-%d"))));
            }
            if let Some(end) = range.end {
                query.push(("created_at".into(), end_of_day_param(end)));
            }
        }

        let response = self
            .http
            .get(self.rest_url("receipts"))
            .headers(self.headers())
            .query(&query)
            .send()
            .await
            .map_err(|e| CaptureError::DataStore {
                operation: "list",
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::DataStore {
                operation: "list",
                detail: upstream_error(response).await,
            });
        }

        response.json().await.map_err(|e| CaptureError::DataStore {
            operation: "list",
            detail: format!("unexpected response shape: {e}"),
        })
    }

    async fn update_receipt(
        &self,
        id: &str,
        user_id: &str,
        patch: &ReceiptPatch,
    ) -> Result<PersistedReceipt, CaptureError> {
        let response = self
            .http
            .patch(self.rest_url("receipts"))
            .headers(self.headers())
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))])
            .json(patch)
            .send()
            .await
            .map_err(|e| CaptureError::DataStore {
                operation: "update",
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::DataStore {
                operation: "update",
                detail: upstream_error(response).await,
            });
        }

        let mut rows: Vec<PersistedReceipt> =
            response.json().await.map_err(|e| CaptureError::DataStore {
                operation: "update",
                detail: format!("unexpected response shape: {e}"),
            })?;
        rows.pop().ok_or_else(|| CaptureError::DataStore {
            operation: "update",
            detail: format!("no receipt '{id}' for this user"),
        })
    }

    async fn delete_receipt(&self, id: &str, user_id: &str) -> Result<(), CaptureError> {
        let response = self
            .http
            .delete(self.rest_url("receipts"))
            .headers(self.headers())
            .query(&[("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))])
            .send()
            .await
            .map_err(|e| CaptureError::DataStore {
                operation: "delete",
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::DataStore {
                operation: "delete",
                detail: upstream_error(response).await,
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
        let payload = json!({
            "user_id": user_id,
            "category": category,
            "budget_amount": amount,
        });

        // merge-duplicates + on_conflict is PostgREST's atomic
        // insert-or-update on the (user_id, category) unique constraint.
        let response = self
            .http
            .post(self.rest_url("category_budgets"))
            .headers(self.headers())
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", "user_id,category")])
            .json(&payload)
            .send()
            .await
            .map_err(|e| CaptureError::DataStore {
                operation: "upsert",
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::DataStore {
                operation: "upsert",
                detail: upstream_error(response).await,
            });
        }

        let mut rows: Vec<CategoryBudget> =
            response.json().await.map_err(|e| CaptureError::DataStore {
                operation: "upsert",
                detail: format!("unexpected response shape: {e}"),
            })?;
        rows.pop().ok_or_else(|| CaptureError::DataStore {
            operation: "upsert",
            detail: "empty representation returned".into(),
        })
    }

    async fn list_budgets(&self, user_id: &str) -> Result<Vec<CategoryBudget>, CaptureError> {
        let user_filter = format!("eq.{user_id}");
        let response = self
            .http
            .get(self.rest_url("category_budgets"))
            .headers(self.headers())
            .query(&[("select", "*"), ("user_id", user_filter.as_str())])
            .send()
            .await
            .map_err(|e| CaptureError::DataStore {
                operation: "list",
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::DataStore {
                operation: "list",
                detail: upstream_error(response).await,
            });
        }

        response.json().await.map_err(|e| CaptureError::DataStore {
            operation: "list",
            detail: format!("unexpected response shape: {e}"),
        })
    }
}

// ── BlobStore ────────────────────────────────────────────────────────────

#[async_trait]
impl BlobStore for SupabaseClient {
    async fn upload(&self, name: &str, bytes: &[u8], mime: &str) -> Result<String, CaptureError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, name);
        debug!("uploading {} bytes to {}", bytes.len(), url);

        let mime_header =
            HeaderValue::from_str(mime).unwrap_or(HeaderValue::from_static("application/octet-stream"));

        let response = self
            .http
            .post(&url)
            .headers(self.headers())
            .header(CONTENT_TYPE, mime_header)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| CaptureError::UploadFailed {
                name: name.to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::UploadFailed {
                name: name.to_string(),
                detail: upstream_error(response).await,
            });
        }

        Ok(self.public_url(name))
    }
}

// ── AuthService ──────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, CaptureError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/token", self.base_url))
            .headers(self.headers())
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| CaptureError::Auth { detail: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CaptureError::Auth {
                detail: upstream_error(response).await,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| CaptureError::Auth {
            detail: format!("unexpected response shape: {e}"),
        })?;
        Ok(AuthSession {
            access_token: token.access_token,
            user: token.user,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, CaptureError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .headers(self.headers())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| CaptureError::Auth { detail: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CaptureError::Auth {
                detail: upstream_error(response).await,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| CaptureError::Auth {
            detail: format!("unexpected response shape: {e}"),
        })?;
        Ok(AuthSession {
            access_token: token.access_token,
            user: token.user,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), CaptureError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(|e| CaptureError::Auth { detail: e.to_string() })?;

        // GoTrue answers 204 on success, which is_success covers.
        if !response.status().is_success() {
            return Err(CaptureError::Auth {
                detail: upstream_error(response).await,
            });
        }
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthUser, CaptureError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(|e| CaptureError::Auth { detail: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CaptureError::Auth {
                detail: upstream_error(response).await,
            });
        }

        response.json().await.map_err(|e| CaptureError::Auth {
            detail: format!("unexpected response shape: {e}"),
        })
    }
}
