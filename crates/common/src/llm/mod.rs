pub mod openai;
pub mod prompts;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Per-call deadline for completion and embedding requests.
pub const LLM_TIMEOUT_SECS: u64 = 30;
/// Transient failures are retried this many times with quadratic backoff.
pub const LLM_MAX_RETRIES: u64 = 2;
const LLM_RETRY_BASE_MS: u64 = 300;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub id: String,
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Completion capability the engine needs from an LLM provider. Errors are
/// opaque to callers; the provider is responsible for retrying transient
/// transport failures.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<ChatCompletion, AppError>;
}

/// Embedding capability. Vectors must match the configured dimension; the
/// engine probes this once at startup.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;
}

/// Quadratic backoff schedule: 300ms, 1200ms.
pub(crate) fn retry_delays() -> impl Iterator<Item = Duration> {
    (0..LLM_MAX_RETRIES).map(|n| Duration::from_millis(LLM_RETRY_BASE_MS * (n + 1) * (n + 1)))
}
