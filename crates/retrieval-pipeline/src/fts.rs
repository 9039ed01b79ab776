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

#[derive(Debug, Clone)]
pub struct TextHit {
    pub document: Document,
    pub text_score: f32,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    rank: Option<f32>,
}

/// BM25 full-text search over document content via the `simple` analyzer,
/// best rank first.
pub async fn find_documents_by_text(
    db: &SurrealDbClient,
    query: &str,
    k: usize,
    screen: Option<&str>,
) -> Result<Vec<TextHit>, AppError> {
    let screen_clause = if screen.is_some() {
        "AND screen = $screen "
    } else {
        ""
    };
    let sql = format!(
        "SELECT id, search::score(0) AS rank \
         FROM document \
         WHERE content @0@ $terms \
         {screen_clause}\
         ORDER BY rank DESC \
         LIMIT $limit"
    );

    let mut request = db
        .client
        .query(sql)
        .bind(("terms", query.to_owned()))
        .bind(("limit", k as i64));
    if let Some(screen) = screen {
        request = request.bind(("screen", screen.to_owned()));
    }
    let mut response = request.await?;
    let rows: Vec<ScoreRow> = response.take(0)?;

    debug!(hits = rows.len(), "full-text search finished");

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
            hits.push(TextHit {
                document,
                text_score: row.rank.unwrap_or_default(),
            });
        }
    }

    Ok(hits)
}
