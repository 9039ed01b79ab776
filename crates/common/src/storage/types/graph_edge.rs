use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use serde_json::Value;

fn default_weight() -> f32 {
    1.0
}

stored_object!(GraphEdge, "edge", {
    source_id: String,
    target_id: String,
    relation_type: String,
    #[serde(default = "default_weight")]
    weight: f32,
    properties: Value
});

impl GraphEdge {
    /// Deterministic identity derived from both endpoints and the relation.
    pub fn id_for(source_id: &str, target_id: &str, relation_type: &str) -> String {
        format!("edge_{source_id}_{relation_type}_{target_id}")
    }

    pub fn new(
        source_id: String,
        target_id: String,
        relation_type: String,
        weight: Option<f32>,
        properties: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(&source_id, &target_id, &relation_type),
            created_at: now,
            updated_at: now,
            source_id,
            target_id,
            relation_type,
            weight: weight.unwrap_or_else(default_weight),
            properties,
        }
    }

    /// Upserts the edge; a row with the same id has its relation type,
    /// weight and properties replaced.
    pub async fn upsert(db: &SurrealDbClient, edge: &GraphEdge) -> Result<(), AppError> {
        db.client
            .query("UPSERT type::thing('edge', $id) CONTENT $edge")
            .bind(("id", edge.id.clone()))
            .bind(("edge", edge.clone()))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn delete(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.delete_item::<GraphEdge>(id).await?;
        Ok(())
    }
}
