//! Error types for the receiptflow library.
//!
//! One enum, [`CaptureError`], grouped by failure class. The grouping
//! matters because each class has a different recovery story:
//!
//! * **Input errors** are rejected before any external call is made and
//!   surfaced straight to the caller.
//! * **Gateway errors** (OCR or structuring upstream failure) are
//!   recoverable: the workflow returns to image selection with the
//!   upstream message attached and no partial record written.
//! * **Workflow errors** mark transitions the state machine forbids —
//!   always a caller bug, never swallowed.
//! * **Storage errors** carry the underlying store message and leave the
//!   workflow state unchanged so the same action can be retried.
//!
//! Parse/format failures of the model's response are deliberately NOT
//! errors: the extraction parser repairs them to empty defaults so the
//! user can finish the record by hand (see [`crate::extract`]).

use thiserror::Error;

use crate::workflow::CaptureState;

/// All errors returned by the receiptflow library.
#[derive(Debug, Error)]
pub enum CaptureError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No image has been selected for this capture session.
    #[error("No receipt image selected.\nPick a photo before processing.")]
    MissingImage,

    /// The selected bytes do not decode as a supported image format.
    #[error("Selected file is not a readable image: {detail}")]
    UnreadableImage { detail: String },

    /// Structuring was requested with no OCR text to structure.
    #[error("No OCR text to structure — the receipt scan produced nothing to extract from.")]
    MissingOcrText,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Gateway errors ────────────────────────────────────────────────────
    /// The configured model provider is not initialised (missing API key etc.).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The OCR call failed after all retries.
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    /// The structuring call failed after all retries.
    #[error("Structuring failed: {detail}")]
    StructuringFailed { detail: String },

    // ── Workflow errors ───────────────────────────────────────────────────
    /// An action was attempted in a state that does not permit it.
    #[error("Cannot {action} while in the {from:?} step")]
    InvalidTransition {
        from: CaptureState,
        action: &'static str,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Uploading the receipt image to the blob store failed.
    #[error("Upload of '{name}' failed: {detail}")]
    UploadFailed { name: String, detail: String },

    /// A data-store operation failed. `operation` names the row action
    /// (insert/list/update/delete/upsert) for log grepping.
    #[error("Data store {operation} failed: {detail}")]
    DataStore {
        operation: &'static str,
        detail: String,
    },

    /// An auth-service call failed (bad credentials, expired session, …).
    #[error("Authentication failed: {detail}")]
    Auth { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaptureError {
    /// Whether the workflow treats this error as recoverable: the session
    /// returns to image selection and the user may simply try again.
    ///
    /// Input and gateway failures are recoverable; a forbidden transition
    /// is a programming error and is not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CaptureError::InvalidTransition { .. } | CaptureError::InvalidConfig(_)
        )
    }
}
