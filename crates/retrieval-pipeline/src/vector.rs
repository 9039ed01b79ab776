use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::document::{deserialize_flexible_id, Document},
        types::StoredObject,
    },
};
use serde::Deserialize;
use surrealdb::RecordId;
use tracing::debug;

use crate::scoring::distance_to_similarity;

/// HNSW search effort.
const KNN_EF: usize = 40;

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub document: Document,
    pub distance: f32,
    pub vector_score: f32,
}

#[derive(Debug, Deserialize)]
struct DistanceRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    distance: f32,
}

/// K-nearest documents by L2 distance over the embedding index, closest
/// first. Rows without an embedding are never indexed and so never match.
///
/// # Errors
///
/// `InvalidEmbedding` when the query vector has the wrong width or contains
/// a non-finite element.
pub async fn find_documents_by_vector(
    db: &SurrealDbClient,
    embedding: Vec<f32>,
    k: usize,
    screen: Option<&str>,
    dimensions: usize,
) -> Result<Vec<VectorHit>, AppError> {
    if embedding.len() != dimensions {
        return Err(AppError::InvalidEmbedding(format!(
            "expected length {}, got {}",
            dimensions,
            embedding.len()
        )));
    }
    if embedding.iter().any(|value| !value.is_finite()) {
        return Err(AppError::InvalidEmbedding(
            "embedding contains a non-finite element".to_string(),
        ));
    }

    let screen_clause = if screen.is_some() {
        "AND screen = $screen "
    } else {
        ""
    };
    let sql = format!(
        "SELECT id, vector::distance::knn() AS distance \
         FROM document \
         WHERE embedding <|{k},{KNN_EF}|> $embedding \
         {screen_clause}\
         ORDER BY distance ASC \
         LIMIT {k}"
    );

    let mut query = db.client.query(sql).bind(("embedding", embedding));
    if let Some(screen) = screen {
        query = query.bind(("screen", screen.to_owned()));
    }
    let mut response = query.await?;
    let rows: Vec<DistanceRow> = response.take(0)?;

    debug!(hits = rows.len(), "vector search finished");

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let things: Vec<RecordId> = rows
        .iter()
        .map(|row| RecordId::from_table_key(Document::table_name(), &row.id))
        .collect();
    let mut documents_response = db
        .client
        .query("SELECT * FROM document WHERE id IN $things")
        .bind(("things", things))
        .await?;
    let documents: Vec<Document> = documents_response.take(0)?;

    let mut by_id: HashMap<String, Document> = documents
        .into_iter()
        .map(|document| (document.id.clone(), document))
        .collect();

    let mut hits = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(document) = by_id.remove(&row.id) {
            hits.push(VectorHit {
                document,
                distance: row.distance,
                vector_score: distance_to_similarity(row.distance),
            });
        }
    }

    Ok(hits)
}
