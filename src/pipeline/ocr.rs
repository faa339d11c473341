//! OCR gateway: image bytes in, best-effort plain text out.
//!
//! A stateless adapter around one vision-model call. The image travels
//! inline as base64 — vision APIs accept data-URI attachments in the JSON
//! request body, and a receipt photo is comfortably below their size
//! limits.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from model APIs are transient and frequent.
//! Exponential backoff (`retry_backoff_ms * 2^attempt`) gives the wait
//! sequence 500 ms → 1 s → 2 s with the defaults, under 4 s of total
//! back-off before the failure is surfaced as recoverable.
//!
//! "No text found" is NOT a failure: a blank or hopeless photo yields an
//! empty string, and the caller decides what an empty scan means.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::model::ImageSource;
use crate::prompts::OCR_PROMPT;

/// Stateless text extraction from a receipt image.
#[async_trait]
pub trait OcrGateway: Send + Sync {
    /// Extract all readable text. Empty output is valid ("no text found");
    /// errors mean the input was unusable or the upstream call failed.
    async fn extract_text(&self, image: &ImageSource) -> Result<String, CaptureError>;
}

/// Production gateway driving a vision-capable model provider.
pub struct VisionOcrGateway {
    provider: Arc<dyn LLMProvider>,
    config: CaptureConfig,
}

impl VisionOcrGateway {
    pub fn new(provider: Arc<dyn LLMProvider>, config: CaptureConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl OcrGateway for VisionOcrGateway {
    async fn extract_text(&self, image: &ImageSource) -> Result<String, CaptureError> {
        // Input guards run before any network call: a missing or
        // undecodable image is the caller's error, not the provider's.
        validate_image(image)?;

        let messages = vec![
            ChatMessage::system(OCR_PROMPT),
            ChatMessage::user_with_images("", vec![encode_image(image)]),
        ];
        let options = build_options(&self.config);

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "OCR: retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "OCR: {} chars of text, {} output tokens",
                        response.content.len(),
                        response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let msg = format!("{e}");
                    warn!("OCR: attempt {} failed — {}", attempt + 1, msg);
                    last_err = Some(msg);
                }
            }
        }

        Err(CaptureError::OcrFailed {
            detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

/// Reject missing or undecodable image bytes before any external call.
pub fn validate_image(image: &ImageSource) -> Result<(), CaptureError> {
    if image.bytes.is_empty() {
        return Err(CaptureError::MissingImage);
    }
    image::guess_format(&image.bytes).map_err(|e| CaptureError::UnreadableImage {
        detail: format!("{e}"),
    })?;
    Ok(())
}

/// Wrap the raw bytes as a base64 attachment for the vision API.
///
/// `detail: "high"` matters for receipts: the interesting content is fine
/// print, and the low-detail single-tile mode loses exactly that.
fn encode_image(image: &ImageSource) -> ImageData {
    let b64 = STANDARD.encode(&image.bytes);
    ImageData::new(b64, image.mime.clone()).with_detail("high")
}

fn build_options(config: &CaptureConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
