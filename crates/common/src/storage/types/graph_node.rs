use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::graph_edge::GraphEdge},
    stored_object,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use surrealdb::RecordId;

stored_object!(GraphNode, "node", {
    name: String,
    node_type: String,
    properties: Value,
    embedding: Option<Vec<f32>>
});

/// One adjacency row returned by [`GraphNode::get_neighbors`].
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEntry {
    pub node: GraphNode,
    pub relation_type: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeNeighbors {
    pub outgoing: Vec<NeighborEntry>,
    pub incoming: Vec<NeighborEntry>,
}

impl GraphNode {
    /// Deterministic identity: two entities with the same lowercased name
    /// and type collapse to the same id.
    pub fn id_for(name: &str, node_type: &str) -> String {
        let digest = Sha256::digest(format!("{}::{}", name.to_lowercase(), node_type));
        let hex = format!("{digest:x}");
        format!("node_{}", &hex[..16])
    }

    pub fn new(name: String, node_type: String, properties: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(&name, &node_type),
            created_at: now,
            updated_at: now,
            name,
            node_type,
            properties,
            embedding: None,
        }
    }

    /// Upserts the node, replacing every field of an existing row.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when an embedding is present and its length does
    /// not equal `dimensions`.
    pub async fn upsert(
        db: &SurrealDbClient,
        node: &GraphNode,
        dimensions: usize,
    ) -> Result<(), AppError> {
        if let Some(embedding) = &node.embedding {
            if embedding.len() != dimensions {
                return Err(AppError::DimensionMismatch {
                    expected: dimensions,
                    actual: embedding.len(),
                });
            }
        }

        db.client
            .query("UPSERT type::thing('node', $id) CONTENT $node")
            .bind(("id", node.id.clone()))
            .bind(("node", node.clone()))
            .await?
            .check()?;

        Ok(())
    }

    /// Deletes the node and every incident edge in one transaction.
    pub async fn delete(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.client
            .query(
                "BEGIN TRANSACTION; \
                 DELETE edge WHERE source_id = $id OR target_id = $id; \
                 DELETE type::thing('node', $id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_owned()))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn find_by_id(db: &SurrealDbClient, id: &str) -> Result<Option<GraphNode>, AppError> {
        Ok(db.get_item(id).await?)
    }

    /// Bulk lookup preserving nothing about input order; callers index by id.
    pub async fn find_by_ids(
        db: &SurrealDbClient,
        ids: &[String],
    ) -> Result<Vec<GraphNode>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let things: Vec<RecordId> = ids
            .iter()
            .map(|id| RecordId::from_table_key("node", id))
            .collect();

        let mut response = db
            .client
            .query("SELECT * FROM node WHERE id IN $things")
            .bind(("things", things))
            .await?;

        Ok(response.take(0)?)
    }

    /// Case-insensitive exact name match.
    pub async fn find_by_name(
        db: &SurrealDbClient,
        name: &str,
    ) -> Result<Option<GraphNode>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM node WHERE string::lowercase(name) = $name LIMIT 1")
            .bind(("name", name.to_lowercase()))
            .await?;

        let rows: Vec<GraphNode> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_by_names(
        db: &SurrealDbClient,
        names: &[String],
    ) -> Result<Vec<GraphNode>, AppError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let lowered: Vec<String> = names.iter().map(|name| name.to_lowercase()).collect();

        let mut response = db
            .client
            .query("SELECT * FROM node WHERE string::lowercase(name) IN $names")
            .bind(("names", lowered))
            .await?;

        Ok(response.take(0)?)
    }

    /// Case-insensitive substring search over node names. The needle is
    /// matched literally: `%`, `_` and backslash have no pattern meaning
    /// because no pattern language is involved.
    pub async fn search(
        db: &SurrealDbClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM node \
                 WHERE string::contains(string::lowercase(name), $needle) \
                 LIMIT $limit",
            )
            .bind(("needle", query.to_lowercase()))
            .bind(("limit", limit as i64))
            .await?;

        Ok(response.take(0)?)
    }

    /// Outgoing and incoming adjacency via the edge table.
    pub async fn get_neighbors(
        db: &SurrealDbClient,
        id: &str,
    ) -> Result<NodeNeighbors, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM edge WHERE source_id = $id")
            .query("SELECT * FROM edge WHERE target_id = $id")
            .bind(("id", id.to_owned()))
            .await?;

        let outgoing_edges: Vec<GraphEdge> = response.take(0)?;
        let incoming_edges: Vec<GraphEdge> = response.take(1)?;

        let mut neighbor_ids: Vec<String> = Vec::new();
        for edge in &outgoing_edges {
            neighbor_ids.push(edge.target_id.clone());
        }
        for edge in &incoming_edges {
            neighbor_ids.push(edge.source_id.clone());
        }
        neighbor_ids.sort();
        neighbor_ids.dedup();

        let nodes = Self::find_by_ids(db, &neighbor_ids).await?;
        let by_id: std::collections::HashMap<&str, &GraphNode> =
            nodes.iter().map(|node| (node.id.as_str(), node)).collect();

        let mut neighbors = NodeNeighbors::default();
        for edge in &outgoing_edges {
            if let Some(node) = by_id.get(edge.target_id.as_str()) {
                neighbors.outgoing.push(NeighborEntry {
                    node: (*node).clone(),
                    relation_type: edge.relation_type.clone(),
                    weight: edge.weight,
                });
            }
        }
        for edge in &incoming_edges {
            if let Some(node) = by_id.get(edge.source_id.as_str()) {
                neighbors.incoming.push(NeighborEntry {
                    node: (*node).clone(),
                    relation_type: edge.relation_type.clone(),
                    weight: edge.weight,
                });
            }
        }

        Ok(neighbors)
    }
}
