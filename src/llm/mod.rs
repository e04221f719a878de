//! Language model collaborator.
//!
//! Provides the [`LanguageModel`] trait, its error type, and the
//! timeout-plus-single-retry wrapper both the classifier and the reasoner use.
//! [`openrouter::OpenRouterModel`] is the HTTP implementation.

pub mod openrouter;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a language model call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("language model timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("language model not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Timeouts and 5xx responses are worth one retry; nothing else is.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Status { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

/// Shape of the reply the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// A single JSON object.
    Json,
}

/// One prompt sent to the model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub format: ResponseFormat,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature,
            format: ResponseFormat::Text,
        }
    }

    pub fn json(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            format: ResponseFormat::Json,
            ..Self::text(prompt, max_tokens, temperature)
        }
    }
}

/// A text-completion model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `request`, returning the raw reply text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Call `model` with a per-attempt timeout, retrying once on a transient failure.
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String, LlmError> {
    match attempt(model, request, timeout).await {
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "transient model failure, retrying once");
            attempt(model, request, timeout).await
        }
        other => other,
    }
}

async fn attempt(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String, LlmError> {
    tokio::time::timeout(timeout, model.complete(request))
        .await
        .unwrap_or(Err(LlmError::Timeout))
}

/// Pull the first balanced JSON object out of a model reply.
///
/// Handles markdown fences and chatty text around the object. Braces inside
/// string literals are skipped.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
