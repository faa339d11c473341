//! Configuration for the capture pipeline's model calls.
//!
//! All gateway behaviour is controlled through [`CaptureConfig`], built via
//! its [`CaptureConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config between the OCR and structuring gateways and
//! to log the settings of a misbehaving run.
//!
//! # Design choice: builder over constructor
//! Callers set only what they care about and rely on documented defaults
//! for the rest; new fields never break existing call sites.

use crate::error::CaptureError;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;

/// Configuration for receipt capture.
///
/// Built via [`CaptureConfig::builder()`] or [`CaptureConfig::default()`].
///
/// # Example
/// ```rust
/// use receiptflow::CaptureConfig;
///
/// let config = CaptureConfig::builder()
///     .model("gemini-2.0-flash")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct CaptureConfig {
    /// Model identifier, e.g. "gpt-4.1-nano", "gemini-2.0-flash".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `provider`, auto-detects from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription, not creative writing: the model should
    /// report what is on the receipt, deterministically. Any temperature
    /// above zero only adds variance to monetary fields.
    pub temperature: f32,

    /// Maximum tokens per model response. Default: 2048.
    ///
    /// A long grocery receipt produces a few hundred tokens of OCR text
    /// and a comparable amount of structured JSON; 2048 covers both calls
    /// with headroom while keeping a runaway response bounded.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient model-API failure. Default: 3.
    ///
    /// Most 5xx and timeout errors are transient. Permanent errors (bad
    /// API key, 400) fail on the first attempt anyway; retrying them three
    /// times costs seconds, not correctness.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl CaptureConfig {
    /// Create a new builder for `CaptureConfig`.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CaptureConfig`].
#[derive(Debug)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CaptureConfig, CaptureError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(CaptureError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the model provider, from most-specific to least-specific.
///
/// The four-level fallback chain lets library users and CLI users each set
/// exactly as much or as little as they need:
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed
///    the provider entirely; we use it as-is. Useful in tests or when the
///    caller needs custom middleware.
///
/// 2. **Named provider + model** (`config.provider_name`) — reads the
///    corresponding API key (`OPENAI_API_KEY`, etc.) from the environment.
///
/// 3. **Environment pair** (`RECEIPTFLOW_LLM_PROVIDER` +
///    `RECEIPTFLOW_MODEL`) — a provider/model choice made at the execution
///    environment level (shell profile, CI) is honoured even when several
///    API keys are present.
///
/// 4. **Full auto-detection** — the factory scans all known API-key
///    variables and picks the first available provider.
pub fn resolve_provider(config: &CaptureConfig) -> Result<Arc<dyn LLMProvider>, CaptureError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    // 3) Honour RECEIPTFLOW_LLM_PROVIDER + RECEIPTFLOW_MODEL when both set
    if let (Ok(prov), Ok(model)) = (
        std::env::var("RECEIPTFLOW_LLM_PROVIDER"),
        std::env::var("RECEIPTFLOW_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    // 4) Auto-detect from the environment
    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CaptureError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No model provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or GEMINI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
///
/// Both capture calls need vision-capable chat, so the provider factory is
/// used uniformly for every provider name.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, CaptureError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        CaptureError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
