use std::{collections::HashMap, sync::Arc};

use common::{
    error::AppError,
    llm::{ChatModel, EmbeddingModel},
    storage::{
        db::SurrealDbClient,
        types::{graph_edge::GraphEdge, graph_node::GraphNode},
    },
    utils::config::RagConfig,
};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::extractor::EntityExtractor;

/// Per-row upsert counts; overwrites of existing rows are included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphIngestOutcome {
    pub nodes_created: usize,
    pub edges_created: usize,
}

/// Turns raw document text into knowledge-graph rows.
pub struct GraphBuilder {
    db: Arc<SurrealDbClient>,
    extractor: EntityExtractor,
    embedder: Arc<dyn EmbeddingModel>,
    config: RagConfig,
}

impl GraphBuilder {
    pub fn new(
        db: Arc<SurrealDbClient>,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingModel>,
        config: RagConfig,
    ) -> Self {
        Self {
            db,
            extractor: EntityExtractor::new(chat),
            embedder,
            config,
        }
    }

    /// Extracts entities and relations from `content` and persists them.
    ///
    /// Entity-name embeddings are issued concurrently and are best-effort:
    /// a failed embedding call leaves that node without a vector. A
    /// successful embedding of the wrong width fails the whole build before
    /// any write. Relations are resolved strictly against the entities
    /// extracted from this document; a relation with an unresolved endpoint
    /// is skipped without side effects.
    #[instrument(skip_all)]
    pub async fn build_graph_from_document(
        &self,
        content: &str,
    ) -> Result<GraphIngestOutcome, AppError> {
        let extraction = self.extractor.extract(content).await?;

        let embeddings: Vec<Option<Vec<f32>>> = join_all(
            extraction
                .entities
                .iter()
                .map(|entity| async { self.embedder.embed(&entity.name).await.ok() }),
        )
        .await;

        let dimensions = self.config.embedding_dimensions;
        for embedding in embeddings.iter().flatten() {
            if embedding.len() != dimensions {
                return Err(AppError::DimensionMismatch {
                    expected: dimensions,
                    actual: embedding.len(),
                });
            }
        }

        let mut ids_by_name: HashMap<String, String> = HashMap::new();
        let mut outcome = GraphIngestOutcome::default();

        for (entity, embedding) in extraction.entities.iter().zip(embeddings) {
            let mut node = GraphNode::new(
                entity.name.clone(),
                entity.entity_type.clone(),
                Value::Object(entity.properties.clone()),
            );
            node.embedding = embedding;

            GraphNode::upsert(&self.db, &node, dimensions).await?;
            ids_by_name.insert(entity.name.to_lowercase(), node.id);
            outcome.nodes_created += 1;
        }

        for relation in &extraction.relations {
            let source_id = ids_by_name.get(&relation.source.to_lowercase());
            let target_id = ids_by_name.get(&relation.target.to_lowercase());
            let (Some(source_id), Some(target_id)) = (source_id, target_id) else {
                debug!(
                    source = %relation.source,
                    target = %relation.target,
                    "skipping relation with unresolved endpoint"
                );
                continue;
            };

            let edge = GraphEdge::new(
                source_id.clone(),
                target_id.clone(),
                relation.relation_type.clone(),
                relation.weight,
                Value::Object(Map::new()),
            );
            GraphEdge::upsert(&self.db, &edge).await?;
            outcome.edges_created += 1;
        }

        info!(
            nodes = outcome.nodes_created,
            edges = outcome.edges_created,
            "graph build finished"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::llm::{ChatCompletion, ChatMessage, CompletionOptions};
    use uuid::Uuid;

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

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingModel for FixedEmbedder {
        async fn embed(&self, _input: &str) -> Result<Vec<f32>, AppError> {
            Ok(self.vector.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingModel for FailingEmbedder {
        async fn embed(&self, _input: &str) -> Result<Vec<f32>, AppError> {
            Err(AppError::LLMParsing("embedding backend down".to_string()))
        }
    }

    async fn setup_db() -> Arc<SurrealDbClient> {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(3)
            .await
            .expect("Failed to initialize schema");
        Arc::new(db)
    }

    fn builder(
        db: Arc<SurrealDbClient>,
        reply: &str,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> GraphBuilder {
        GraphBuilder::new(
            db,
            Arc::new(FixedChat {
                reply: reply.to_string(),
            }),
            embedder,
            RagConfig {
                embedding_dimensions: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_dangling_relation_is_skipped() {
        let db = setup_db().await;
        let reply = r#"{
            "entities": [
                {"name": "Aspirin", "type": "drug"},
                {"name": "Fever", "type": "symptom"}
            ],
            "relations": [
                {"source": "Aspirin", "target": "Fever", "relationType": "treats"},
                {"source": "Unknown", "target": "Fever", "relationType": "related_to"}
            ]
        }"#;
        let builder = builder(
            db.clone(),
            reply,
            Arc::new(FixedEmbedder {
                vector: vec![0.1, 0.2, 0.3],
            }),
        );

        let outcome = builder
            .build_graph_from_document("Aspirin treats fever.")
            .await
            .expect("graph build failed");

        assert_eq!(outcome.nodes_created, 2);
        assert_eq!(outcome.edges_created, 1);

        let aspirin = GraphNode::find_by_name(&db, "Aspirin")
            .await
            .expect("lookup")
            .expect("aspirin exists");
        assert_eq!(aspirin.embedding, Some(vec![0.1, 0.2, 0.3]));
    }

    #[tokio::test]
    async fn test_wrong_embedding_width_fails_before_writes() {
        let db = setup_db().await;
        let reply = r#"{
            "entities": [{"name": "Aspirin", "type": "drug"}],
            "relations": []
        }"#;
        let builder = builder(
            db.clone(),
            reply,
            Arc::new(FixedEmbedder {
                vector: vec![1.0, 2.0],
            }),
        );

        match builder.build_graph_from_document("Aspirin.").await {
            Err(AppError::DimensionMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other.map(|_| ())),
        }

        let nodes = GraphNode::find_by_names(&db, &["Aspirin".to_string()])
            .await
            .expect("lookup");
        assert!(nodes.is_empty(), "No writes may happen on a failed build");
    }

    #[tokio::test]
    async fn test_embedding_failure_is_best_effort() {
        let db = setup_db().await;
        let reply = r#"{
            "entities": [{"name": "Aspirin", "type": "drug"}],
            "relations": []
        }"#;
        let builder = builder(db.clone(), reply, Arc::new(FailingEmbedder));

        let outcome = builder
            .build_graph_from_document("Aspirin.")
            .await
            .expect("graph build failed");

        assert_eq!(outcome.nodes_created, 1);
        let aspirin = GraphNode::find_by_name(&db, "Aspirin")
            .await
            .expect("lookup")
            .expect("aspirin exists");
        assert_eq!(aspirin.embedding, None);
    }

    #[tokio::test]
    async fn test_rebuilding_same_document_counts_overwrites() {
        let db = setup_db().await;
        let reply = r#"{
            "entities": [{"name": "Aspirin", "type": "drug"}],
            "relations": []
        }"#;
        let builder = builder(
            db.clone(),
            reply,
            Arc::new(FixedEmbedder {
                vector: vec![0.0, 0.0, 0.0],
            }),
        );

        let first = builder
            .build_graph_from_document("Aspirin.")
            .await
            .expect("first build");
        let second = builder
            .build_graph_from_document("Aspirin.")
            .await
            .expect("second build");

        assert_eq!(first.nodes_created, 1);
        assert_eq!(second.nodes_created, 1, "upsert invocations are counted");
    }
}
