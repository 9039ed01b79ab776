use common::{
    error::AppError,
    llm::{prompts::DEFAULT_PLANNER_SYSTEM_PROMPT, ChatMessage, ChatModel, CompletionOptions},
    utils::json::extract_json_object,
};
use tracing::{debug, warn};

use crate::plan::SearchPlan;

/// Intent analysis (LLM call 1). Runs at temperature 0 against the fixed
/// planner prompt. Parse and validation failures fall back to searching the
/// user message directly; transport errors surface to the caller.
pub async fn plan_request(
    chat: &dyn ChatModel,
    messages: &[ChatMessage],
    user_message: &str,
) -> Result<SearchPlan, AppError> {
    let mut request = Vec::with_capacity(messages.len() + 1);
    request.push(ChatMessage::system(DEFAULT_PLANNER_SYSTEM_PROMPT));
    request.extend(messages.iter().cloned());

    let completion = chat
        .complete(
            &request,
            CompletionOptions {
                temperature: Some(0.0),
                max_tokens: None,
            },
        )
        .await?;

    match parse_plan(&completion.content) {
        Ok(plan) => {
            debug!(should_search = plan.should_search, "planner produced a plan");
            Ok(plan)
        }
        Err(error) => {
            warn!(%error, "falling back to default search plan");
            Ok(SearchPlan::fallback(user_message))
        }
    }
}

fn parse_plan(content: &str) -> Result<SearchPlan, AppError> {
    let object = extract_json_object(content)
        .ok_or_else(|| AppError::LLMParsing("No JSON object in planner response".to_string()))?;
    serde_json::from_str(object)
        .map_err(|e| AppError::LLMParsing(format!("Failed to parse planner response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::llm::ChatCompletion;

    struct FixedChat {
        reply: String,
    }

    #[async_trait]
    impl ChatModel for FixedChat {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: CompletionOptions,
        ) -> Result<ChatCompletion, AppError> {
            Ok(ChatCompletion {
                id: "fixed".to_string(),
                content: self.reply.clone(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn test_valid_plan_is_used() {
        let chat = FixedChat {
            reply: r#"{"should_search": false, "search_query": "n/a", "identified_entities": [], "top_k": 2}"#
                .to_string(),
        };
        let messages = [ChatMessage::user("hello there")];

        let plan = plan_request(&chat, &messages, "hello there")
            .await
            .expect("planning failed");

        assert!(!plan.should_search);
        assert_eq!(plan.top_k, Some(2.0));
    }

    #[tokio::test]
    async fn test_non_json_reply_falls_back() {
        let chat = FixedChat {
            reply: "not-json".to_string(),
        };
        let messages = [ChatMessage::user("what is rust")];

        let plan = plan_request(&chat, &messages, "what is rust")
            .await
            .expect("planning failed");

        assert_eq!(plan, SearchPlan::fallback("what is rust"));
    }

    #[tokio::test]
    async fn test_wrong_shape_falls_back() {
        let chat = FixedChat {
            reply: r#"{"unexpected": "shape"}"#.to_string(),
        };
        let messages = [ChatMessage::user("what is rust")];

        let plan = plan_request(&chat, &messages, "what is rust")
            .await
            .expect("planning failed");

        assert!(plan.should_search);
        assert_eq!(plan.search_query.as_deref(), Some("what is rust"));
    }
}
