use std::sync::Arc;

use common::{
    error::AppError,
    llm::{
        prompts::DEFAULT_COMPLETION_SYSTEM_PREAMBLE, ChatMessage, ChatModel, CompletionOptions,
        EmbeddingModel, MessageRole, TokenUsage,
    },
    storage::{
        db::SurrealDbClient,
        types::{cache_entry::CacheEntry, document::Document},
    },
    utils::{
        config::RagConfig,
        json::{canonical_json, sha256_hex},
    },
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::{
    graph_context, hybrid_search,
    plan::{normalize_plan, NormalizedPlan},
    planner,
    scoring::Scored,
};

/// Bumping this invalidates every existing cache row.
pub const CACHE_VERSION: &str = "v2";

#[derive(Debug, Clone, Serialize)]
pub struct RagResult {
    pub document: Document,
    pub vector_score: Option<f32>,
    pub text_score: Option<f32>,
    pub score: f64,
}

impl From<Scored<Document>> for RagResult {
    fn from(scored: Scored<Document>) -> Self {
        Self {
            document: scored.item,
            vector_score: scored.scores.vector,
            text_score: scored.scores.text,
            score: scored.fused,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RagPayload {
    pub results: Vec<RagResult>,
    pub plan: NormalizedPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub rag: RagPayload,
}

/// Stateless request orchestrator: plan → cache → retrieve → graph enrich →
/// complete → persist. Store and provider errors surface to the caller; the
/// HTTP layer is expected to map them.
pub struct RagChatService {
    db: Arc<SurrealDbClient>,
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingModel>,
    config: RagConfig,
}

impl RagChatService {
    pub fn new(
        db: Arc<SurrealDbClient>,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingModel>,
        config: RagConfig,
    ) -> Self {
        Self {
            db,
            chat,
            embedder,
            config,
        }
    }

    #[instrument(skip_all)]
    pub async fn process_rag_request(
        &self,
        messages: &[ChatMessage],
        context: &Map<String, Value>,
    ) -> Result<ChatResponse, AppError> {
        let user_message = last_user_message(messages);

        let raw_plan = planner::plan_request(self.chat.as_ref(), messages, &user_message).await?;
        let plan = normalize_plan(raw_plan, &user_message);

        let hash = request_hash(messages, context, &plan);

        if let Some(entry) = CacheEntry::find_by_hash(&self.db, &hash).await? {
            CacheEntry::increment_hit_count(&self.db, &hash).await?;
            debug!(request_hash = %hash, "serving cached response");
            return Ok(ChatResponse {
                id: "cached".to_string(),
                content: entry.response,
                usage: None,
                rag: RagPayload {
                    results: Vec::new(),
                    plan,
                },
            });
        }

        let screen = context.get("screen").and_then(Value::as_str);
        let mut results: Vec<RagResult> = Vec::new();
        let mut rag_context = String::new();

        if plan.should_search {
            let embedding = self.embedder.embed(&plan.search_query).await?;
            let hits = hybrid_search(
                &self.db,
                &plan.search_query,
                embedding,
                plan.top_k,
                screen,
                self.config.embedding_dimensions,
            )
            .await?;

            rag_context = hits
                .iter()
                .map(|hit| hit.item.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            results = hits.into_iter().map(RagResult::from).collect();
        }

        if !plan.identified_entities.is_empty() {
            if let Some(graph_context) =
                graph_context::get_context_for_entities(&self.db, &plan.identified_entities).await?
            {
                if !rag_context.is_empty() {
                    rag_context.push_str("\n\n");
                }
                rag_context.push_str(&graph_context);
            }
        }

        let mut system_prompt = DEFAULT_COMPLETION_SYSTEM_PREAMBLE.to_string();
        if !rag_context.is_empty() {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&rag_context);
        }

        let mut request = Vec::with_capacity(messages.len() + 1);
        request.push(ChatMessage::system(system_prompt));
        request.extend(messages.iter().cloned());

        let completion = self
            .chat
            .complete(&request, CompletionOptions::default())
            .await?;

        CacheEntry::save(
            &self.db,
            &hash,
            &user_message,
            Value::Object(context.clone()),
            &completion.content,
        )
        .await?;

        Ok(ChatResponse {
            id: completion.id,
            content: completion.content,
            usage: completion.usage,
            rag: RagPayload { results, plan },
        })
    }
}

fn last_user_message(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::User)
        .map(|message| message.content.clone())
        .unwrap_or_default()
}

/// Cache key: SHA-256 of the canonical JSON of the versioned request shape.
/// Canonicalization sorts object keys recursively, so logically equal
/// requests hash identically regardless of construction order.
pub fn request_hash(
    messages: &[ChatMessage],
    context: &Map<String, Value>,
    plan: &NormalizedPlan,
) -> String {
    let payload = json!({
        "cacheVersion": CACHE_VERSION,
        "messages": messages,
        "context": context,
        "plan": plan,
    });
    sha256_hex(&canonical_json(&payload))
}
