//! # receiptflow
//!
//! Turn receipt photos into structured expense records using vision
//! language models.
//!
//! ## Why this crate?
//!
//! Hand-keying receipts into an expense tracker is the chore that kills
//! the habit. This crate drives the full capture flow instead: photograph
//! the receipt, OCR it with a vision model, structure the text into
//! merchant/date/total/line-items/category with a strict extraction
//! contract, repair whatever the model actually returned, let the user fix
//! the result, and commit exactly one clean row. The model's output is
//! treated as untrusted input throughout — a garbage response degrades to
//! an empty form, never to a lost or corrupted record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo
//!  │
//!  ├─ 1. Upload     image → blob store, public URL recorded
//!  ├─ 2. OCR        vision model reads all text off the image
//!  ├─ 3. Structure  strict-contract JSON extraction from the OCR text
//!  ├─ 4. Parse      normalise + repair the response into draft fields
//!  ├─ 5. Review     user amends the draft (or enters one manually)
//!  └─ 6. Commit     reconciler writes one row to the data store
//! ```
//!
//! Steps 1–4 run inside [`workflow::CaptureSession::process`]; the session
//! is an explicit state machine (`Upload → Processing → Review → Success`,
//! plus a manual-entry path) so illegal moves are errors, not bugs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use receiptflow::{
//!     CaptureConfig, CaptureSession, ImageSource, ModelStructuringGateway,
//!     SupabaseClient, VisionOcrGateway, resolve_provider,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = CaptureConfig::default();
//!     let provider = resolve_provider(&config)?;
//!
//!     let store = Arc::new(SupabaseClient::new(
//!         std::env::var("SUPABASE_URL")?,
//!         std::env::var("SUPABASE_KEY")?,
//!     )?);
//!
//!     let mut session = CaptureSession::new(
//!         "user-id",
//!         Arc::new(VisionOcrGateway::new(provider.clone(), config.clone())),
//!         Arc::new(ModelStructuringGateway::new(provider, config)),
//!         store.clone(),
//!         store,
//!     );
//!
//!     let bytes = std::fs::read("receipt.jpg")?;
//!     session.select_image(ImageSource::new(bytes, "receipt.jpg", "image/jpeg"))?;
//!     session.process().await?;
//!     println!("merchant: {}", session.draft().merchant_name);
//!     session.save().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receiptflow` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! receiptflow = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{resolve_provider, CaptureConfig, CaptureConfigBuilder};
pub use error::CaptureError;
pub use extract::{parse_extraction, ExtractedFields};
pub use model::{
    Category, CategoryBudget, DateRange, ImageSource, LineItem, NewReceipt, PersistedReceipt,
    ReceiptDraft, ReceiptPatch,
};
pub use normalize::{clean_json, normalize_date};
pub use pipeline::{ModelStructuringGateway, OcrGateway, StructuringGateway, VisionOcrGateway};
pub use progress::{CaptureProgress, CaptureStep, NoopProgress, ProgressHandle};
pub use reconcile::{line_items_total, reconcile, CommitPath};
pub use report::{budget_report, category_totals, monthly_totals, BudgetLine};
pub use store::memory::{MemoryBlobStore, MemoryDataStore};
pub use store::supabase::SupabaseClient;
pub use store::{AuthService, AuthSession, AuthUser, BlobStore, DataStore};
pub use workflow::{CaptureSession, CaptureState};
