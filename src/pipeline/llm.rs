//! Extraction client: send a page image plus instructions to a vision model.
//!
//! The model is reached through the narrow [`VisionModel`] capability
//! (`describe(system, image, instructions) -> text`). [`LlmVisionModel`]
//! implements it over any `edgequake_llm` provider; tests substitute fakes.
//!
//! [`ExtractionClient`] layers the retry policy on top: transient failures
//! are retried with exponential backoff (`retry_backoff_ms * 2^(attempt-1)`),
//! empty responses and rejected credentials are returned immediately.

use crate::config::RunConfig;
use crate::error::ExtractError;
use crate::pipeline::encode;
use crate::pipeline::render::RasterImage;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Input to one model call.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    /// Role guidance.
    pub system: &'a str,
    /// Per-page instruction from [`crate::prompts::build_prompt`].
    pub instructions: &'a str,
    pub image: &'a RasterImage,
}

/// Raw model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionReply {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The external vision-language capability.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe(&self, request: VisionRequest<'_>) -> Result<VisionReply, ExtractError>;
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`VisionModel`] over an `edgequake_llm` chat provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &RunConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn describe(&self, request: VisionRequest<'_>) -> Result<VisionReply, ExtractError> {
        let messages = vec![
            ChatMessage::system(request.system),
            ChatMessage::user_with_images(
                request.instructions,
                vec![encode::to_image_data(request.image)],
            ),
        ];
        let options = self.options();

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| ExtractError::Transient(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| classify_llm_error(&e))?;

        if response.finish_reason.as_deref() == Some("content_filter") {
            return Err(ExtractError::InvalidResponse("response withheld by content filter".into()));
        }

        Ok(VisionReply {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Map a provider error onto the extraction taxonomy.
///
/// Typed variants decide directly. Only the free-text variants fall through
/// to [`classify_provider_message`].
pub fn classify_llm_error(error: &LlmError) -> ExtractError {
    let message = error.to_string();
    match error {
        LlmError::AuthError(_) => ExtractError::Auth(message),
        LlmError::RateLimited(_) | LlmError::NetworkError(_) | LlmError::Timeout => ExtractError::Transient(message),
        LlmError::TokenLimitExceeded { .. }
        | LlmError::InvalidRequest(_)
        | LlmError::ModelNotFound(_)
        | LlmError::SerializationError(_)
        | LlmError::ConfigError(_)
        | LlmError::NotSupported(_) => ExtractError::InvalidResponse(message),
        LlmError::ApiError(_) | LlmError::ProviderError(_) | LlmError::Unknown(_) => {
            classify_provider_message(&message)
        }
    }
}

static RE_TRANSIENT_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:408|429|5\d\d)\b").unwrap());
static RE_AUTH_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b40[13]\b").unwrap());

/// Classify a free-text provider failure.
///
/// Status codes count only as whole tokens. A retryable status wins over
/// auth wording, and anything unrecognised is transient and left to the
/// bounded retry budget.
pub fn classify_provider_message(message: &str) -> ExtractError {
    let lower = message.to_ascii_lowercase();
    const AUTH: [&str; 6] = [
        "unauthorized",
        "unauthorised",
        "forbidden",
        "invalid api key",
        "incorrect api key",
        "invalid_api_key",
    ];
    const INVALID: [&str; 5] = [
        "content_filter",
        "content filter",
        "empty response",
        "context length",
        "context_length_exceeded",
    ];

    if RE_TRANSIENT_STATUS.is_match(&lower) {
        ExtractError::Transient(message.to_string())
    } else if RE_AUTH_STATUS.is_match(&lower) || AUTH.iter().any(|p| lower.contains(p)) {
        ExtractError::Auth(message.to_string())
    } else if INVALID.iter().any(|p| lower.contains(p)) {
        ExtractError::InvalidResponse(message.to_string())
    } else {
        ExtractError::Transient(message.to_string())
    }
}

// ── Retry layer ──────────────────────────────────────────────────────────

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

/// A successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Calls made, including the successful one.
    pub attempts: u32,
}

/// Sends one page to the model with retries.
#[derive(Clone)]
pub struct ExtractionClient {
    model: Arc<dyn VisionModel>,
    system_prompt: String,
    policy: RetryPolicy,
}

impl ExtractionClient {
    pub fn new(model: Arc<dyn VisionModel>, system_prompt: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            policy,
        }
    }

    pub fn from_config(model: Arc<dyn VisionModel>, config: &RunConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Self::new(model, system_prompt, RetryPolicy::from_config(config))
    }

    /// Extract text from `image` following `instructions`.
    ///
    /// Never returns [`ExtractError::Transient`]: exhausted retries surface
    /// as [`ExtractError::RetriesExhausted`].
    pub async fn extract(&self, image: &RasterImage, instructions: &str) -> Result<Extracted, ExtractError> {
        let page_num = image.page_num;
        let request = VisionRequest {
            system: &self.system_prompt,
            instructions,
            image,
        };

        let mut last_err = String::new();
        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let backoff = self.policy.delay(attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page_num,
                    attempt,
                    self.policy.max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match self.model.describe(request).await {
                Ok(reply) if reply.text.trim().is_empty() => {
                    return Err(ExtractError::InvalidResponse("model returned no text".into()));
                }
                Ok(reply) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, attempt {}",
                        page_num,
                        reply.input_tokens,
                        reply.output_tokens,
                        attempt + 1
                    );
                    return Ok(Extracted {
                        text: reply.text,
                        input_tokens: reply.input_tokens,
                        output_tokens: reply.output_tokens,
                        attempts: attempt + 1,
                    });
                }
                Err(ExtractError::Transient(detail)) => {
                    warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, detail);
                    last_err = detail;
                }
                Err(fatal_or_invalid) => return Err(fatal_or_invalid),
            }
        }

        Err(ExtractError::RetriesExhausted {
            attempts: self.policy.max_retries + 1,
            detail: last_err,
        })
    }
}
