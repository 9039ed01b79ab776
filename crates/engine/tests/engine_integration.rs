use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use common::{
    error::AppError,
    llm::{ChatCompletion, ChatMessage, ChatModel, CompletionOptions, EmbeddingModel},
    storage::types::{cache_entry::CacheEntry, document::Document},
    utils::config::RagConfig,
};
use engine::{Engine, EngineConfig, StoreCredentials, StoreTarget};
use serde_json::Map;
use uuid::Uuid;

/// Returns the same reply for every completion call.
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

/// Returns one scripted reply per call, in order.
struct ScriptedChat {
    replies: Mutex<Vec<String>>,
}

impl ScriptedChat {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: CompletionOptions,
    ) -> Result<ChatCompletion, AppError> {
        let content = self
            .replies
            .lock()
            .expect("scripted replies poisoned")
            .pop()
            .expect("no scripted reply left");
        Ok(ChatCompletion {
            id: "scripted".to_string(),
            content,
            usage: None,
        })
    }
}

/// Records every input and answers with a fixed vector.
struct RecordingEmbedder {
    vector: Vec<f32>,
    inputs: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl RecordingEmbedder {
    fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            inputs: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingModel for RecordingEmbedder {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .expect("recorded inputs poisoned")
            .push(input.to_string());
        Ok(self.vector.clone())
    }
}

fn memory_credentials() -> StoreCredentials {
    StoreCredentials {
        address: "mem://".to_string(),
        username: String::new(),
        password: String::new(),
        namespace: "engine_tests".to_string(),
        database: Uuid::new_v4().to_string(),
    }
}

fn rag_config() -> RagConfig {
    RagConfig {
        embedding_dimensions: 3,
    }
}

#[tokio::test]
async fn probe_mismatch_rejects_creation() {
    // Provider answers with a 3-wide vector while the store expects 1536.
    let config = EngineConfig {
        store: StoreTarget::Url(memory_credentials()),
        llm: Arc::new(FixedChat {
            reply: "unused".to_string(),
        }),
        embedding: RecordingEmbedder::new(vec![1.0, 2.0, 3.0]),
        rag: RagConfig {
            embedding_dimensions: 1536,
        },
    };

    match Engine::create(config).await {
        Err(AppError::DimensionMismatch { expected, actual }) => {
            assert_eq!(expected, 1536);
            assert_eq!(actual, 3);
        }
        Ok(_) => panic!("Engine creation must fail on a probe mismatch"),
        Err(other) => panic!("Expected DimensionMismatch, got {other}"),
    }
}

#[tokio::test]
async fn probe_failure_leaves_external_client_usable() {
    let external = surrealdb::engine::any::connect("mem://")
        .await
        .expect("external client");
    external
        .use_ns("engine_tests")
        .use_db(Uuid::new_v4().to_string())
        .await
        .expect("select ns/db");

    let config = EngineConfig {
        store: StoreTarget::Client(external.clone()),
        llm: Arc::new(FixedChat {
            reply: "unused".to_string(),
        }),
        embedding: RecordingEmbedder::new(vec![1.0, 2.0, 3.0]),
        rag: RagConfig {
            embedding_dimensions: 1536,
        },
    };

    assert!(matches!(
        Engine::create(config).await,
        Err(AppError::DimensionMismatch { .. })
    ));

    // A borrowed client is never closed by the engine.
    external
        .query("RETURN 1")
        .await
        .expect("external client should remain usable");
}

#[tokio::test]
async fn close_is_owned_only() {
    let embedding = RecordingEmbedder::new(vec![0.0, 1.0, 0.0]);
    let engine = Engine::create(EngineConfig {
        store: StoreTarget::Url(memory_credentials()),
        llm: Arc::new(FixedChat {
            reply: "unused".to_string(),
        }),
        embedding,
        rag: rag_config(),
    })
    .await
    .expect("engine creation failed");

    assert!(engine.db().owns_connection());
    engine.close().await.expect("close failed");
    assert!(engine.db().is_closed());

    let external = surrealdb::engine::any::connect("mem://")
        .await
        .expect("external client");
    external
        .use_ns("engine_tests")
        .use_db(Uuid::new_v4().to_string())
        .await
        .expect("select ns/db");

    let borrowed_engine = Engine::create(EngineConfig {
        store: StoreTarget::Client(external),
        llm: Arc::new(FixedChat {
            reply: "unused".to_string(),
        }),
        embedding: RecordingEmbedder::new(vec![0.0, 1.0, 0.0]),
        rag: rag_config(),
    })
    .await
    .expect("engine creation failed");

    borrowed_engine.close().await.expect("close failed");
    assert!(!borrowed_engine.db().is_closed());
}

#[tokio::test]
async fn ingest_embeds_truncated_copy_and_stores_full_content() {
    // Extraction finds nothing; the test is about the embedding boundary.
    let empty_extraction = r#"{"entities": [], "relations": []}"#;
    let chat = Arc::new(FixedChat {
        reply: empty_extraction.to_string(),
    });
    let embedding = RecordingEmbedder::new(vec![0.0, 1.0, 0.0]);

    let engine = Engine::create(EngineConfig {
        store: StoreTarget::Url(memory_credentials()),
        llm: chat,
        embedding: embedding.clone(),
        rag: rag_config(),
    })
    .await
    .expect("engine creation failed");

    let content = format!("{}\n\n{}", "A".repeat(5900), "B".repeat(2000));
    engine
        .ingest_document(&content)
        .await
        .expect("ingestion failed");

    // Call 0 is the probe; call 1 is the document embedding.
    let inputs = embedding.inputs.lock().expect("recorded inputs poisoned");
    assert_eq!(inputs[0], "regular-rag dimension probe");
    assert_eq!(inputs[1], "A".repeat(5900));

    // The stored content is the full document, not the embedded copy.
    let mut response = engine
        .db()
        .client
        .query("SELECT * FROM document")
        .await
        .expect("query documents");
    let documents: Vec<Document> = response.take(0).expect("take documents");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].content, content);
    assert_eq!(documents[0].embedding.as_deref(), Some(&[0.0, 1.0, 0.0][..]));
}

#[tokio::test]
async fn ingest_builds_graph_from_full_content() {
    let extraction = r#"{
        "entities": [
            {"name": "Aspirin", "type": "drug"},
            {"name": "Fever", "type": "symptom"}
        ],
        "relations": [
            {"source": "Aspirin", "target": "Fever", "relationType": "treats"},
            {"source": "Unknown", "target": "Fever", "relationType": "related_to"}
        ]
    }"#;
    let engine = Engine::create(EngineConfig {
        store: StoreTarget::Url(memory_credentials()),
        llm: Arc::new(FixedChat {
            reply: extraction.to_string(),
        }),
        embedding: RecordingEmbedder::new(vec![0.0, 1.0, 0.0]),
        rag: rag_config(),
    })
    .await
    .expect("engine creation failed");

    let outcome = engine
        .ingest_document("Aspirin treats fever.")
        .await
        .expect("ingestion failed");

    assert_eq!(outcome.nodes_created, 2);
    assert_eq!(outcome.edges_created, 1);
}

#[tokio::test]
async fn identical_queries_hit_the_cache() {
    let plan = r#"{"should_search": false, "search_query": "x", "identified_entities": [], "top_k": 5}"#;
    let chat = ScriptedChat::new(&[plan, "the saved answer", plan]);
    let embedding = RecordingEmbedder::new(vec![0.0, 1.0, 0.0]);

    let engine = Engine::create(EngineConfig {
        store: StoreTarget::Url(memory_credentials()),
        llm: chat,
        embedding: embedding.clone(),
        rag: rag_config(),
    })
    .await
    .expect("engine creation failed");

    let messages = [ChatMessage::user("x")];
    let context = Map::new();

    let first = engine
        .query(&messages, &context)
        .await
        .expect("first query failed");
    assert_eq!(first.content, "the saved answer");

    let second = engine
        .query(&messages, &context)
        .await
        .expect("second query failed");
    assert_eq!(second.id, "cached");
    assert_eq!(second.content, "the saved answer");

    // Only the probe ever touched the embedding provider.
    assert_eq!(embedding.calls.load(Ordering::SeqCst), 1);

    let hash =
        retrieval_pipeline::chat::request_hash(&messages, &context, &second.rag.plan);
    let entry = CacheEntry::find_by_hash(engine.db(), &hash)
        .await
        .expect("cache lookup")
        .expect("cache entry exists");
    assert_eq!(entry.hit_count, 1);
}

#[tokio::test]
async fn query_retrieves_ingested_documents() {
    let empty_extraction = r#"{"entities": [], "relations": []}"#;
    let plan = r#"{"should_search": true, "search_query": "tokio runtime", "identified_entities": [], "top_k": 3}"#;

    let chat = ScriptedChat::new(&[empty_extraction, plan, "grounded answer"]);
    let embedding = RecordingEmbedder::new(vec![0.0, 1.0, 0.0]);

    let engine = Engine::create(EngineConfig {
        store: StoreTarget::Url(memory_credentials()),
        llm: chat,
        embedding,
        rag: rag_config(),
    })
    .await
    .expect("engine creation failed");

    engine
        .ingest_document("The tokio runtime schedules asynchronous tasks.")
        .await
        .expect("ingestion failed");
    engine
        .db()
        .rebuild_indexes()
        .await
        .expect("rebuild indexes");

    let response = engine
        .query(&[ChatMessage::user("how does tokio work?")], &Map::new())
        .await
        .expect("query failed");

    assert_eq!(response.content, "grounded answer");
    assert_eq!(response.rag.plan.top_k, 3);
    assert_eq!(response.rag.results.len(), 1);
    assert!(response.rag.results[0]
        .document
        .content
        .contains("tokio runtime"));
}
