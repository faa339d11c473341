//! Progress-callback trait for capture pipeline events.
//!
//! Inject an `Arc<dyn CaptureProgress>` into
//! [`crate::workflow::CaptureSession`] to receive an event as each pipeline
//! step starts, completes, or fails.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a terminal step list, a UI progress widget, or a
//! log — without the library knowing anything about how the host
//! application communicates. The trait is `Send + Sync` so a session can
//! be driven from any async task.

use std::fmt;
use std::sync::Arc;

/// The four pipeline steps, in execution order.
///
/// The display labels are the ones the capture UI shows while a receipt is
/// being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    /// Uploading the image to the blob store.
    Upload,
    /// OCR: reading text off the image.
    Ocr,
    /// Structuring: turning OCR text into fields.
    Structure,
    /// Parsing and repairing the structured response.
    Parse,
}

impl CaptureStep {
    /// All steps, in order. Useful for rendering a step checklist.
    pub const ALL: [CaptureStep; 4] = [
        CaptureStep::Upload,
        CaptureStep::Ocr,
        CaptureStep::Structure,
        CaptureStep::Parse,
    ];

    /// Human-facing label for this step.
    pub fn label(&self) -> &'static str {
        match self {
            CaptureStep::Upload => "Uploading Image",
            CaptureStep::Ocr => "Detecting Text",
            CaptureStep::Structure => "Extracting Data",
            CaptureStep::Parse => "Categorizing",
        }
    }
}

impl fmt::Display for CaptureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the capture workflow as the pipeline advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Steps are strictly sequential, so implementations
/// never see interleaved step events for one session.
pub trait CaptureProgress: Send + Sync {
    /// Called once when processing begins, before any step runs.
    fn on_capture_start(&self, total_steps: usize) {
        let _ = total_steps;
    }

    /// Called just before a step begins.
    fn on_step_start(&self, step: CaptureStep) {
        let _ = step;
    }

    /// Called when a step finishes successfully.
    fn on_step_complete(&self, step: CaptureStep) {
        let _ = step;
    }

    /// Called when a step fails. Processing stops after this event and the
    /// workflow returns to image selection.
    fn on_step_error(&self, step: CaptureStep, error: &str) {
        let _ = (step, error);
    }

    /// Called once after the pipeline finishes, successfully or not.
    fn on_capture_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl CaptureProgress for NoopProgress {}

/// Convenience alias for the injected callback type.
pub type ProgressHandle = Arc<dyn CaptureProgress>;
