use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use serde_json::Value;
use uuid::Uuid;

stored_object!(Document, "document", {
    content: String,
    path: Option<String>,
    screen: Option<String>,
    domain: Option<String>,
    metadata: Option<Value>,
    embedding: Option<Vec<f32>>
});

impl Document {
    pub fn new(content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            content,
            path: None,
            screen: None,
            domain: None,
            metadata: None,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_screen(mut self, screen: impl Into<String>) -> Self {
        self.screen = Some(screen.into());
        self
    }

    /// Writes or overwrites the row identified by `doc.id`.
    ///
    /// The full-text index over `content` is recomputed by the store on
    /// every write. `created_at` survives overwrites; `updated_at` is set
    /// to server time.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when an embedding is present and its length does
    /// not equal `dimensions`; `Database` on store failures.
    pub async fn upsert(
        db: &SurrealDbClient,
        doc: &Document,
        dimensions: usize,
    ) -> Result<(), AppError> {
        if let Some(embedding) = &doc.embedding {
            if embedding.len() != dimensions {
                return Err(AppError::DimensionMismatch {
                    expected: dimensions,
                    actual: embedding.len(),
                });
            }
        }

        db.client
            .query(
                "UPSERT type::thing('document', $id) SET \
                    content = $content, \
                    path = $path, \
                    screen = $screen, \
                    domain = $domain, \
                    metadata = $metadata, \
                    embedding = $embedding, \
                    created_at = IF created_at != NONE THEN created_at ELSE time::now() END, \
                    updated_at = time::now()",
            )
            .bind(("id", doc.id.clone()))
            .bind(("content", doc.content.clone()))
            .bind(("path", doc.path.clone()))
            .bind(("screen", doc.screen.clone()))
            .bind(("domain", doc.domain.clone()))
            .bind(("metadata", doc.metadata.clone()))
            .bind(("embedding", doc.embedding.clone()))
            .await?
            .check()?;

        Ok(())
    }
}
