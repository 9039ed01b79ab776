use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::error::AppError;

use super::{
    retry_delays, ChatCompletion, ChatMessage, ChatModel, CompletionOptions, EmbeddingModel,
    MessageRole, TokenUsage, LLM_TIMEOUT_SECS,
};

/// Transient transport failures worth retrying: request timeouts, 408, 429
/// and server-side 5xx.
fn is_transient(error: &AppError) -> bool {
    match error {
        AppError::ProviderTimeout(_) => true,
        AppError::OpenAI(OpenAIError::Reqwest(e)) => {
            e.is_timeout()
                || e.is_connect()
                || e
                    .status()
                    .map(|status| {
                        status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error()
                    })
                    .unwrap_or(false)
        }
        _ => false,
    }
}

fn build_chat_request(
    model: &str,
    messages: &[ChatMessage],
    options: CompletionOptions,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let mut mapped: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let request_message = match message.role {
            MessageRole::System => {
                ChatCompletionRequestSystemMessage::from(message.content.as_str()).into()
            }
            MessageRole::User => {
                ChatCompletionRequestUserMessage::from(message.content.as_str()).into()
            }
            MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.as_str())
                .build()?
                .into(),
        };
        mapped.push(request_message);
    }

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(model).messages(mapped);
    if let Some(temperature) = options.temperature {
        args.temperature(temperature);
    }
    if let Some(max_tokens) = options.max_tokens {
        args.max_tokens(max_tokens);
    }
    args.build()
}

/// Completion provider backed by an OpenAI-compatible API. All retries share
/// the same request body.
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<ChatCompletion, AppError> {
        let request = build_chat_request(&self.model, messages, options)?;

        let response = RetryIf::spawn(
            retry_delays(),
            || {
                let request = request.clone();
                async move {
                    match timeout(
                        Duration::from_secs(LLM_TIMEOUT_SECS),
                        self.client.chat().create(request),
                    )
                    .await
                    {
                        Ok(result) => result.map_err(AppError::OpenAI),
                        Err(_) => {
                            warn!(model = %self.model, "chat completion timed out");
                            Err(AppError::ProviderTimeout(LLM_TIMEOUT_SECS))
                        }
                    }
                }
            },
            is_transient,
        )
        .await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(AppError::LLMParsing(
                "No content found in LLM response".into(),
            ))?;

        debug!(id = %response.id, "chat completion received");

        Ok(ChatCompletion {
            id: response.id,
            content,
            usage: response.usage.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        })
    }
}

/// Embedding provider backed by an OpenAI-compatible API.
pub struct OpenAiEmbeddingModel {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbeddingModel {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>, dimensions: u32) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimensions)
            .input([input])
            .build()?;

        let response = RetryIf::spawn(
            retry_delays(),
            || {
                let request = request.clone();
                async move {
                    match timeout(
                        Duration::from_secs(LLM_TIMEOUT_SECS),
                        self.client.embeddings().create(request),
                    )
                    .await
                    {
                        Ok(result) => result.map_err(AppError::OpenAI),
                        Err(_) => {
                            warn!(model = %self.model, "embedding request timed out");
                            Err(AppError::ProviderTimeout(LLM_TIMEOUT_SECS))
                        }
                    }
                }
            },
            is_transient,
        )
        .await?;

        let embedding = response
            .data
            .first()
            .ok_or_else(|| AppError::LLMParsing("No embedding data received".into()))?
            .embedding
            .clone();

        Ok(embedding)
    }
}
