pub mod chat;
pub mod fts;
pub mod graph_context;
pub mod plan;
pub mod planner;
pub mod scoring;
pub mod vector;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document::Document},
};
use scoring::Scored;
use tracing::instrument;

pub use chat::{ChatResponse, RagChatService, RagPayload, RagResult};

/// Hybrid retrieval: the vector and full-text branches run concurrently and
/// are fused with Reciprocal Rank Fusion.
#[instrument(skip(db, embedding))]
pub async fn hybrid_search(
    db: &SurrealDbClient,
    query: &str,
    embedding: Vec<f32>,
    k: usize,
    screen: Option<&str>,
    dimensions: usize,
) -> Result<Vec<Scored<Document>>, AppError> {
    let (vector_hits, text_hits) = tokio::try_join!(
        vector::find_documents_by_vector(db, embedding, k, screen, dimensions),
        fts::find_documents_by_text(db, query, k, screen),
    )?;

    Ok(scoring::reciprocal_rank_fusion(vector_hits, text_hits, k))
}
