pub mod ingest;

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError,
    llm::{
        openai::{OpenAiChatModel, OpenAiEmbeddingModel},
        ChatMessage, ChatModel, EmbeddingModel,
    },
    storage::{db::SurrealDbClient, types::document::Document},
    utils::config::{AppConfig, RagConfig},
};
use ingestion_pipeline::{GraphBuilder, GraphIngestOutcome};
use retrieval_pipeline::{ChatResponse, RagChatService};
use serde_json::{Map, Value};
use surrealdb::{engine::any::Any, Surreal};
use tracing::info;

/// Fixed input used to detect a model/store dimension mismatch at startup.
const DIMENSION_PROBE_INPUT: &str = "regular-rag dimension probe";

#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub address: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

/// Where the engine gets its store handle: a URL it connects to and owns,
/// or a client the host application already manages.
pub enum StoreTarget {
    Url(StoreCredentials),
    Client(Surreal<Any>),
}

pub struct EngineConfig {
    pub store: StoreTarget,
    pub llm: Arc<dyn ChatModel>,
    pub embedding: Arc<dyn EmbeddingModel>,
    pub rag: RagConfig,
}

/// Facade wiring the store adapter, the chat orchestrator and the graph
/// builder behind `query`, `ingest_document` and `close`.
pub struct Engine {
    db: Arc<SurrealDbClient>,
    embedder: Arc<dyn EmbeddingModel>,
    chat_service: RagChatService,
    graph_builder: GraphBuilder,
    config: RagConfig,
}

impl Engine {
    /// Acquires the store, initializes the schema and probes the embedding
    /// dimension. If anything fails after the store was acquired, an owned
    /// connection is released before the error is surfaced; a borrowed
    /// client is left untouched.
    pub async fn create(config: EngineConfig) -> Result<Self, AppError> {
        let db = match config.store {
            StoreTarget::Url(credentials) => Arc::new(
                SurrealDbClient::connect(
                    &credentials.address,
                    &credentials.username,
                    &credentials.password,
                    &credentials.namespace,
                    &credentials.database,
                )
                .await?,
            ),
            StoreTarget::Client(client) => Arc::new(SurrealDbClient::from_client(client)),
        };

        if let Err(error) = Self::initialize(&db, config.embedding.as_ref(), config.rag).await {
            let _ = db.close().await;
            return Err(error);
        }

        let chat_service = RagChatService::new(
            db.clone(),
            config.llm.clone(),
            config.embedding.clone(),
            config.rag,
        );
        let graph_builder =
            GraphBuilder::new(db.clone(), config.llm, config.embedding.clone(), config.rag);

        Ok(Engine {
            db,
            embedder: config.embedding,
            chat_service,
            graph_builder,
            config: config.rag,
        })
    }

    async fn initialize(
        db: &SurrealDbClient,
        embedder: &dyn EmbeddingModel,
        rag: RagConfig,
    ) -> Result<(), AppError> {
        db.ensure_connected().await?;
        db.ensure_initialized(rag.embedding_dimensions).await?;

        let probe = embedder.embed(DIMENSION_PROBE_INPUT).await?;
        if probe.len() != rag.embedding_dimensions {
            return Err(AppError::DimensionMismatch {
                expected: rag.embedding_dimensions,
                actual: probe.len(),
            });
        }

        info!(
            dimensions = rag.embedding_dimensions,
            "embedding dimension probe succeeded"
        );
        Ok(())
    }

    /// Convenience constructor wiring OpenAI-backed providers from process
    /// configuration.
    pub async fn from_app_config(config: &AppConfig) -> Result<Self, AppError> {
        let openai = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        );
        let llm = Arc::new(OpenAiChatModel::new(openai.clone(), &config.completion_model));
        let embedding = Arc::new(OpenAiEmbeddingModel::new(
            openai,
            &config.embedding_model,
            config.embedding_dimensions as u32,
        ));

        Self::create(EngineConfig {
            store: StoreTarget::Url(StoreCredentials {
                address: config.surrealdb_address.clone(),
                username: config.surrealdb_username.clone(),
                password: config.surrealdb_password.clone(),
                namespace: config.surrealdb_namespace.clone(),
                database: config.surrealdb_database.clone(),
            }),
            llm,
            embedding,
            rag: RagConfig {
                embedding_dimensions: config.embedding_dimensions,
            },
        })
        .await
    }

    pub async fn query(
        &self,
        messages: &[ChatMessage],
        context: &Map<String, Value>,
    ) -> Result<ChatResponse, AppError> {
        self.chat_service.process_rag_request(messages, context).await
    }

    /// Stores the full content with an embedding computed on a bounded copy,
    /// then drives the graph builder over the full content.
    pub async fn ingest_document(&self, content: &str) -> Result<GraphIngestOutcome, AppError> {
        let embedding = self.embedder.embed(&ingest::embedding_input(content)).await?;

        let document = Document::new(content.to_string()).with_embedding(embedding);
        Document::upsert(&self.db, &document, self.config.embedding_dimensions).await?;

        self.graph_builder.build_graph_from_document(content).await
    }

    pub async fn close(&self) -> Result<(), AppError> {
        self.db.close().await
    }

    /// Store handle for collaborators (route layers, maintenance jobs).
    pub fn db(&self) -> &Arc<SurrealDbClient> {
        &self.db
    }
}
