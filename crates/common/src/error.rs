use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Provider timed out after {0}s")]
    ProviderTimeout(u64),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
