//! Structuring gateway: OCR text in, strict-contract model response out.
//!
//! This stage is intentionally thin: the contract lives in
//! [`crate::prompts`], JSON validation lives in [`crate::extract`], and all
//! this module owns is the guard, the call, and the retry loop. The
//! verbatim response text is returned untouched — keeping the raw output
//! around is what makes bad extractions debuggable after the fact.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::prompts::extraction_prompt;

/// Stateless structuring of OCR text into the extraction contract.
#[async_trait]
pub trait StructuringGateway: Send + Sync {
    /// Return the model's verbatim response to the extraction prompt.
    /// This gateway does not itself validate JSON-ness.
    async fn extract(&self, ocr_text: &str) -> Result<String, CaptureError>;
}

/// Production gateway driving the model provider with the fixed
/// extraction prompt.
pub struct ModelStructuringGateway {
    provider: Arc<dyn LLMProvider>,
    config: CaptureConfig,
}

impl ModelStructuringGateway {
    pub fn new(provider: Arc<dyn LLMProvider>, config: CaptureConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl StructuringGateway for ModelStructuringGateway {
    async fn extract(&self, ocr_text: &str) -> Result<String, CaptureError> {
        // Guard before the external call: structuring nothing is a caller
        // error, not a model call worth paying for.
        if ocr_text.trim().is_empty() {
            return Err(CaptureError::MissingOcrText);
        }

        let messages = vec![ChatMessage::user(extraction_prompt(ocr_text))];
        let options = build_options(&self.config);

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "structuring: retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "structuring: {} chars of response, {} output tokens",
                        response.content.len(),
                        response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let msg = format!("{e}");
                    warn!("structuring: attempt {} failed — {}", attempt + 1, msg);
                    last_err = Some(msg);
                }
            }
        }

        Err(CaptureError::StructuringFailed {
            detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn build_options(config: &CaptureConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
