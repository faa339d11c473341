//! The capture workflow: an explicit finite-state machine from image
//! selection to committed record.
//!
//! ## Why a state machine?
//!
//! The capture flow has five screens and two paths through them. Modelling
//! that with scattered booleans invites impossible states ("processing"
//! and "manual entry" at once); one authoritative [`CaptureState`] value
//! with guarded transitions makes every illegal move an explicit
//! [`CaptureError::InvalidTransition`] instead of a silent misbehaviour.
//!
//! ```text
//!            ┌──────── back ────────┐
//!            ▼                      │
//! Upload ─ process ─▶ Processing ─▶ Review ─ save ─▶ Success
//!   │  ▲                   │                            │
//!   │  └── pipeline error ─┘                            │
//!   ├─ manual ─▶ ManualEntry ─────── save ──────────────┤
//!   ▲                                                   │
//!   └──────────────── reset ("scan another") ───────────┘
//! ```
//!
//! The session owns the [`ReceiptDraft`] — the only cross-step state — and
//! passes it to whichever step is active. One pipeline runs at a time per
//! session: `process` takes `&mut self`, and the `Upload`-state guard
//! refuses a second start.
//!
//! ## Cancellation
//!
//! Dropping a session mid-`Processing` abandons the in-flight model calls:
//! no cancellation signal is sent, the calls complete or fail on their
//! own, and their results are discarded with the session.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::CaptureError;
use crate::model::{ImageSource, PersistedReceipt, ReceiptDraft};
use crate::pipeline::{upload, OcrGateway, StructuringGateway};
use crate::progress::{CaptureProgress, CaptureStep, NoopProgress, ProgressHandle};
use crate::reconcile::{reconcile, CommitPath};
use crate::store::{BlobStore, DataStore};

/// Where in the capture flow a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Picking an image (or about to re-process the one already picked).
    Upload,
    /// The pipeline is running; no other action is permitted.
    Processing,
    /// Extracted fields are on screen for the user to amend.
    Review,
    /// Typing a receipt in by hand; no OCR or structuring involved.
    ManualEntry,
    /// The record is committed; the session can be reset for another scan.
    Success,
}

/// One capture session: the state value, the draft, and the collaborators
/// the pipeline needs.
pub struct CaptureSession {
    state: CaptureState,
    draft: ReceiptDraft,
    user_id: String,
    ocr: Arc<dyn OcrGateway>,
    structurer: Arc<dyn StructuringGateway>,
    data: Arc<dyn DataStore>,
    blob: Arc<dyn BlobStore>,
    progress: ProgressHandle,
    last_saved: Option<PersistedReceipt>,
}

impl CaptureSession {
    pub fn new(
        user_id: impl Into<String>,
        ocr: Arc<dyn OcrGateway>,
        structurer: Arc<dyn StructuringGateway>,
        data: Arc<dyn DataStore>,
        blob: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            state: CaptureState::Upload,
            draft: ReceiptDraft::default(),
            user_id: user_id.into(),
            ocr,
            structurer,
            data,
            blob,
            progress: Arc::new(NoopProgress),
            last_saved: None,
        }
    }

    /// Attach a progress callback for pipeline step events.
    pub fn with_progress(mut self, progress: Arc<dyn CaptureProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn draft(&self) -> &ReceiptDraft {
        &self.draft
    }

    /// The record committed by the most recent save, if any.
    pub fn last_saved(&self) -> Option<&PersistedReceipt> {
        self.last_saved.as_ref()
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Select (or replace) the receipt image. Only legal while picking.
    pub fn select_image(&mut self, image: ImageSource) -> Result<(), CaptureError> {
        if self.state != CaptureState::Upload {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "select an image",
            });
        }
        info!("selected image '{}' ({} bytes)", image.file_name, image.bytes.len());
        self.draft.image = Some(image);
        Ok(())
    }

    /// Switch to manual entry, skipping OCR and structuring entirely.
    pub fn begin_manual(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Upload {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "start manual entry",
            });
        }
        self.state = CaptureState::ManualEntry;
        Ok(())
    }

    /// Run the processing pipeline on the selected image:
    /// upload → OCR → structuring → parse.
    ///
    /// On success the session enters `Review` — even when the structured
    /// response was unusable, because the parser repairs that to an
    /// all-empty draft the user can fill in by hand. On upload or gateway
    /// failure the session returns to `Upload` with the error surfaced and
    /// nothing persisted.
    pub async fn process(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Upload {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "process",
            });
        }
        if self.draft.image.is_none() {
            return Err(CaptureError::MissingImage);
        }

        self.state = CaptureState::Processing;
        self.progress.on_capture_start(CaptureStep::ALL.len());

        match self.run_pipeline().await {
            Ok(()) => {
                self.state = CaptureState::Review;
                self.progress.on_capture_complete(true);
                Ok(())
            }
            Err(e) => {
                warn!("capture pipeline failed: {e}");
                self.state = CaptureState::Upload;
                self.progress.on_capture_complete(false);
                Err(e)
            }
        }
    }

    /// Mutable access to the draft for review/manual edits.
    pub fn draft_mut(&mut self) -> Result<&mut ReceiptDraft, CaptureError> {
        match self.state {
            CaptureState::Review | CaptureState::ManualEntry => Ok(&mut self.draft),
            _ => Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "edit the draft",
            }),
        }
    }

    /// Commit the draft as one new receipt row.
    ///
    /// From `Review` the (possibly user-edited) total field is persisted
    /// as-is; from `ManualEntry` the total is always recomputed from the
    /// line items. On a store failure the state is left unchanged so the
    /// same save can be retried.
    pub async fn save(&mut self) -> Result<PersistedReceipt, CaptureError> {
        let path = match self.state {
            CaptureState::Review => CommitPath::Scan,
            CaptureState::ManualEntry => CommitPath::Manual,
            _ => {
                return Err(CaptureError::InvalidTransition {
                    from: self.state,
                    action: "save",
                })
            }
        };

        let row = reconcile(&self.draft, &self.user_id, path);
        let saved = self.data.insert_receipt(&row).await?;
        info!(
            "saved receipt {} for user {} ({:?} path)",
            saved.id, self.user_id, path
        );

        self.state = CaptureState::Success;
        self.last_saved = Some(saved.clone());
        Ok(saved)
    }

    /// Leave review or manual entry and return to image selection.
    ///
    /// From `Review` the extracted text and prefilled fields are
    /// discarded but the selected image is kept, so the user can
    /// re-process or re-pick. From `ManualEntry` the typed fields stay.
    pub fn back(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Review => {
                self.draft.clear_extracted();
                self.state = CaptureState::Upload;
                Ok(())
            }
            CaptureState::ManualEntry => {
                self.state = CaptureState::Upload;
                Ok(())
            }
            _ => Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "go back",
            }),
        }
    }

    /// "Scan another": fully reset the transient state after a save.
    pub fn reset(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Success {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "reset",
            });
        }
        self.draft = ReceiptDraft::default();
        self.last_saved = None;
        self.state = CaptureState::Upload;
        Ok(())
    }

    // ── The pipeline ─────────────────────────────────────────────────────

    /// The four sequential steps. Each strictly needs the previous step's
    /// output, so there is nothing to run concurrently.
    async fn run_pipeline(&mut self) -> Result<(), CaptureError> {
        let Some(image) = self.draft.image.clone() else {
            return Err(CaptureError::MissingImage);
        };

        // 1. Upload the image; record its public URL.
        self.progress.on_step_start(CaptureStep::Upload);
        let url = match upload::upload_image(self.blob.as_ref(), &image).await {
            Ok(url) => url,
            Err(e) => {
                self.progress.on_step_error(CaptureStep::Upload, &e.to_string());
                return Err(e);
            }
        };
        self.draft.image_url = Some(url);
        self.progress.on_step_complete(CaptureStep::Upload);

        // 2. OCR. An empty result is valid — the next step's guard decides.
        self.progress.on_step_start(CaptureStep::Ocr);
        let ocr_text = match self.ocr.extract_text(&image).await {
            Ok(text) => text,
            Err(e) => {
                self.progress.on_step_error(CaptureStep::Ocr, &e.to_string());
                return Err(e);
            }
        };
        self.draft.ocr_text = ocr_text;
        self.progress.on_step_complete(CaptureStep::Ocr);

        // 3. Structuring; keeps the verbatim response for the raw view.
        self.progress.on_step_start(CaptureStep::Structure);
        let raw = match self.structurer.extract(&self.draft.ocr_text).await {
            Ok(raw) => raw,
            Err(e) => {
                self.progress.on_step_error(CaptureStep::Structure, &e.to_string());
                return Err(e);
            }
        };
        self.draft.raw_extraction = raw;
        self.progress.on_step_complete(CaptureStep::Structure);

        // 4. Parse/repair. Never fails: worst case is all-empty fields and
        //    the user completes the record in review.
        self.progress.on_step_start(CaptureStep::Parse);
        let fields = crate::extract::parse_extraction(&self.draft.raw_extraction);
        self.draft.merchant_name = fields.merchant_name;
        self.draft.date = fields.date;
        self.draft.total_amount = fields.total_amount;
        self.draft.line_items = fields.line_items;
        self.draft.category = fields.category;
        self.draft.notes = fields.notes;
        self.progress.on_step_complete(CaptureStep::Parse);

        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, LineItem};
    use crate::store::memory::{MemoryBlobStore, MemoryDataStore};
    use async_trait::async_trait;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    struct FixedOcr(&'static str);

    #[async_trait]
    impl OcrGateway for FixedOcr {
        async fn extract_text(&self, _image: &ImageSource) -> Result<String, CaptureError> {
            Ok(self.0.to_string())
        }
    }

    struct FixedStructurer(&'static str);

    #[async_trait]
    impl StructuringGateway for FixedStructurer {
        async fn extract(&self, ocr_text: &str) -> Result<String, CaptureError> {
            if ocr_text.trim().is_empty() {
                return Err(CaptureError::MissingOcrText);
            }
            Ok(self.0.to_string())
        }
    }

    struct FailingStructurer;

    #[async_trait]
    impl StructuringGateway for FailingStructurer {
        async fn extract(&self, _ocr_text: &str) -> Result<String, CaptureError> {
            Err(CaptureError::StructuringFailed {
                detail: "503 from upstream".into(),
            })
        }
    }

    fn session(ocr: &'static str, structured: &'static str) -> CaptureSession {
        CaptureSession::new(
            "u1",
            Arc::new(FixedOcr(ocr)),
            Arc::new(FixedStructurer(structured)),
            Arc::new(MemoryDataStore::new()),
            Arc::new(MemoryBlobStore::new()),
        )
    }

    fn png_image() -> ImageSource {
        ImageSource::new(PNG_MAGIC.to_vec(), "receipt.png", "image/png")
    }

    #[tokio::test]
    async fn happy_path_reaches_review_with_fields() {
        let mut s = session(
            "CAFE X\nTOTAL 42.000",
            "```json\n{\"merchant_name\":\"Cafe X\",\"total_amount\":42000}\n```",
        );
        s.select_image(png_image()).unwrap();
        s.process().await.unwrap();

        assert_eq!(s.state(), CaptureState::Review);
        assert_eq!(s.draft().merchant_name, "Cafe X");
        assert_eq!(s.draft().total_amount, Some(42000.0));
        assert_eq!(s.draft().date, "");
        assert_eq!(s.draft().category, Category::Others);
        assert!(s.draft().line_items.is_empty());
        assert!(s.draft().image_url.is_some());
    }

    #[tokio::test]
    async fn empty_ocr_aborts_to_upload_before_structuring() {
        let mut s = session("", "{\"merchant_name\":\"never reached\"}");
        s.select_image(png_image()).unwrap();

        let err = s.process().await.unwrap_err();
        assert!(matches!(err, CaptureError::MissingOcrText));
        assert_eq!(s.state(), CaptureState::Upload);
        // the image survives for a retry
        assert!(s.draft().image.is_some());
    }

    #[tokio::test]
    async fn gateway_failure_returns_to_upload() {
        let mut s = CaptureSession::new(
            "u1",
            Arc::new(FixedOcr("TOTAL 42.000")),
            Arc::new(FailingStructurer),
            Arc::new(MemoryDataStore::new()),
            Arc::new(MemoryBlobStore::new()),
        );
        s.select_image(png_image()).unwrap();

        let err = s.process().await.unwrap_err();
        assert!(matches!(err, CaptureError::StructuringFailed { .. }));
        assert_eq!(s.state(), CaptureState::Upload);
    }

    #[tokio::test]
    async fn malformed_extraction_still_enters_review() {
        let mut s = session("SOME TEXT", "sorry, no JSON today");
        s.select_image(png_image()).unwrap();
        s.process().await.unwrap();

        assert_eq!(s.state(), CaptureState::Review);
        assert_eq!(s.draft().merchant_name, "");
        assert_eq!(s.draft().total_amount, None);
        assert_eq!(s.draft().raw_extraction, "sorry, no JSON today");
    }

    #[tokio::test]
    async fn process_without_image_is_rejected() {
        let mut s = session("x", "{}");
        let err = s.process().await.unwrap_err();
        assert!(matches!(err, CaptureError::MissingImage));
        assert_eq!(s.state(), CaptureState::Upload);
    }

    #[tokio::test]
    async fn guards_forbid_out_of_state_actions() {
        let mut s = session("x", "{}");

        // cannot edit or save while picking an image
        assert!(matches!(
            s.draft_mut().unwrap_err(),
            CaptureError::InvalidTransition { .. }
        ));
        assert!(matches!(
            s.save().await.unwrap_err(),
            CaptureError::InvalidTransition { .. }
        ));

        // cannot select an image during manual entry
        s.begin_manual().unwrap();
        assert!(matches!(
            s.select_image(png_image()).unwrap_err(),
            CaptureError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn review_save_persists_edited_fields() {
        let mut s = session("TEXT", "{\"merchant_name\":\"Cafe X\",\"total_amount\":42000}");
        s.select_image(png_image()).unwrap();
        s.process().await.unwrap();

        {
            let draft = s.draft_mut().unwrap();
            draft.merchant_name = "Cafe X (edited)".into();
            draft.total_amount = Some(43000.0);
            draft.category = Category::Food;
        }

        let saved = s.save().await.unwrap();
        assert_eq!(s.state(), CaptureState::Success);
        assert_eq!(saved.merchant_name, "Cafe X (edited)");
        assert_eq!(saved.total_amount, Some(43000.0));
        assert_eq!(saved.user_id, "u1");
        assert!(saved.image_url.is_some());
    }

    #[tokio::test]
    async fn manual_save_computes_total_from_items() {
        let mut s = session("unused", "unused");
        s.begin_manual().unwrap();
        {
            let draft = s.draft_mut().unwrap();
            draft.merchant_name = "Corner Deli".into();
            draft.total_amount = Some(1.0); // ignored on the manual path
            draft.line_items = vec![
                LineItem::new("Coffee", 15000.0, 2.0),
                LineItem::new("Bagel", 20000.0, 1.0),
            ];
        }

        let saved = s.save().await.unwrap();
        assert_eq!(saved.total_amount, Some(50000.0));
        assert_eq!(s.state(), CaptureState::Success);
    }

    #[tokio::test]
    async fn back_from_review_keeps_image_drops_fields() {
        let mut s = session("TEXT", "{\"merchant_name\":\"Cafe X\"}");
        s.select_image(png_image()).unwrap();
        s.process().await.unwrap();

        s.back().unwrap();
        assert_eq!(s.state(), CaptureState::Upload);
        assert!(s.draft().image.is_some());
        assert_eq!(s.draft().merchant_name, "");
        assert!(s.draft().ocr_text.is_empty());
    }

    #[tokio::test]
    async fn reset_after_success_clears_everything() {
        let mut s = session("TEXT", "{\"merchant_name\":\"Cafe X\"}");
        s.select_image(png_image()).unwrap();
        s.process().await.unwrap();
        s.save().await.unwrap();

        s.reset().unwrap();
        assert_eq!(s.state(), CaptureState::Upload);
        assert!(s.draft().image.is_none());
        assert!(s.last_saved().is_none());

        // reset is only legal from Success
        assert!(matches!(
            s.reset().unwrap_err(),
            CaptureError::InvalidTransition { .. }
        ));
    }
}
