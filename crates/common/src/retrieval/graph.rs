use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{graph_edge::GraphEdge, graph_node::GraphNode},
    },
};

/// Hard cap on the number of paths returned by [`find_paths`].
pub const MAX_PATHS: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One discovered node in a batched traversal. `path` holds the node ids
/// walked from the seed (exclusive) to this node (inclusive).
#[derive(Debug, Clone)]
pub struct TraversalResult {
    pub node: GraphNode,
    pub start_node_id: String,
    pub depth: usize,
    pub relation_type: String,
    pub direction: Direction,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// A finished walk between two nodes. `nodes` are the hydrated hops after
/// the start node, in walk order; `relations` labels each hop.
#[derive(Debug, Clone)]
pub struct GraphPath {
    pub nodes: Vec<GraphNode>,
    pub relations: Vec<String>,
    pub total_weight: f32,
}

#[derive(Debug, Clone)]
struct FrontierRow {
    node_id: String,
    start_node_id: String,
    relation_type: String,
    direction: Direction,
    depth: usize,
    path: Vec<String>,
}

async fn incident_edges(
    db: &SurrealDbClient,
    ids: &[String],
) -> Result<Vec<GraphEdge>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut response = db
        .client
        .query("SELECT * FROM edge WHERE source_id IN $ids OR target_id IN $ids")
        .bind(("ids", ids.to_vec()))
        .await?;

    Ok(response.take(0)?)
}

fn group_by_endpoint(edges: &[GraphEdge]) -> HashMap<&str, Vec<&GraphEdge>> {
    let mut by_node: HashMap<&str, Vec<&GraphEdge>> = HashMap::new();
    for edge in edges {
        by_node.entry(edge.source_id.as_str()).or_default().push(edge);
        if edge.target_id != edge.source_id {
            by_node.entry(edge.target_id.as_str()).or_default().push(edge);
        }
    }
    by_node
}

/// Breadth-first walk from every seed at once, batching one edge query per
/// depth level.
///
/// Contract: depth-1 rows for every edge incident to a seed (direction is
/// `Outgoing` when the seed sits on the source side); a walk never re-enters
/// a node already on its own path nor its start node; expansion stops at
/// `max_depth`; results are deduplicated by node id, keeping the smallest
/// depth — which breadth-first discovery order yields for free.
#[instrument(skip(db))]
pub async fn traverse_batch(
    db: &SurrealDbClient,
    seed_ids: &[String],
    max_depth: usize,
) -> Result<Vec<TraversalResult>, AppError> {
    if seed_ids.is_empty() || max_depth == 0 {
        return Ok(Vec::new());
    }

    let mut frontier: Vec<FrontierRow> = seed_ids
        .iter()
        .map(|seed| FrontierRow {
            node_id: seed.clone(),
            start_node_id: seed.clone(),
            relation_type: String::new(),
            direction: Direction::Outgoing,
            depth: 0,
            path: Vec::new(),
        })
        .collect();

    // Seeds are never re-expanded; discovered nodes are emitted once.
    let mut expanded: HashSet<String> = seed_ids.iter().cloned().collect();
    let mut discovered: HashSet<String> = HashSet::new();
    let mut rows: Vec<FrontierRow> = Vec::new();

    for _ in 0..max_depth {
        if frontier.is_empty() {
            break;
        }

        let frontier_ids: Vec<String> = {
            let mut ids: Vec<String> = frontier.iter().map(|row| row.node_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let edges = incident_edges(db, &frontier_ids).await?;
        let by_node = group_by_endpoint(&edges);

        let mut next: Vec<FrontierRow> = Vec::new();
        for row in &frontier {
            let Some(incident) = by_node.get(row.node_id.as_str()) else {
                continue;
            };
            for edge in incident {
                let (other, direction) = if edge.source_id == row.node_id {
                    (edge.target_id.clone(), Direction::Outgoing)
                } else {
                    (edge.source_id.clone(), Direction::Incoming)
                };

                if other == row.start_node_id || row.path.contains(&other) {
                    continue;
                }
                if !discovered.insert(other.clone()) {
                    continue;
                }

                let mut path = row.path.clone();
                path.push(other.clone());
                let discovered_row = FrontierRow {
                    node_id: other,
                    start_node_id: row.start_node_id.clone(),
                    relation_type: edge.relation_type.clone(),
                    direction,
                    depth: row.depth + 1,
                    path,
                };

                if expanded.insert(discovered_row.node_id.clone()) {
                    next.push(discovered_row.clone());
                }
                rows.push(discovered_row);
            }
        }
        frontier = next;
    }

    debug!(discovered = rows.len(), "batched traversal finished");

    let ids: Vec<String> = rows.iter().map(|row| row.node_id.clone()).collect();
    let nodes = GraphNode::find_by_ids(db, &ids).await?;
    let by_id: HashMap<String, GraphNode> = nodes
        .into_iter()
        .map(|node| (node.id.clone(), node))
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            by_id.get(&row.node_id).map(|node| TraversalResult {
                node: node.clone(),
                start_node_id: row.start_node_id,
                depth: row.depth,
                relation_type: row.relation_type,
                direction: row.direction,
                path: row.path,
            })
        })
        .collect())
}

/// Induced subgraph around the seeds: the node set is seeds ∪ traversal,
/// and the edges are exactly those with both endpoints inside that set.
pub async fn get_subgraph(
    db: &SurrealDbClient,
    seed_ids: &[String],
    max_depth: usize,
) -> Result<Subgraph, AppError> {
    let traversal = traverse_batch(db, seed_ids, max_depth).await?;

    let mut ids: Vec<String> = seed_ids.to_vec();
    ids.extend(traversal.into_iter().map(|row| row.node.id));
    ids.sort();
    ids.dedup();

    let nodes = GraphNode::find_by_ids(db, &ids).await?;

    let mut response = db
        .client
        .query("SELECT * FROM edge WHERE source_id IN $ids AND target_id IN $ids")
        .bind(("ids", ids))
        .await?;
    let edges: Vec<GraphEdge> = response.take(0)?;

    Ok(Subgraph { nodes, edges })
}

#[derive(Debug, Clone)]
struct Walk {
    node_id: String,
    path: Vec<String>,
    relations: Vec<String>,
    total_weight: f32,
}

/// Enumerates cycle-free walks from `from_id` to `to_id` of at most
/// `max_depth` hops, returning the [`MAX_PATHS`] lightest by accumulated
/// edge weight. Node ids are hydrated in one bulk lookup afterwards; ids
/// that no longer resolve are silently dropped from the hydrated path.
#[instrument(skip(db))]
pub async fn find_paths(
    db: &SurrealDbClient,
    from_id: &str,
    to_id: &str,
    max_depth: usize,
) -> Result<Vec<GraphPath>, AppError> {
    let mut finished: Vec<Walk> = Vec::new();
    let mut frontier = vec![Walk {
        node_id: from_id.to_owned(),
        path: vec![from_id.to_owned()],
        relations: Vec::new(),
        total_weight: 0.0,
    }];

    for _ in 0..max_depth {
        if frontier.is_empty() {
            break;
        }

        let frontier_ids: Vec<String> = {
            let mut ids: Vec<String> = frontier.iter().map(|walk| walk.node_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let edges = incident_edges(db, &frontier_ids).await?;
        let by_node = group_by_endpoint(&edges);

        let mut next: Vec<Walk> = Vec::new();
        for walk in &frontier {
            let Some(incident) = by_node.get(walk.node_id.as_str()) else {
                continue;
            };
            for edge in incident {
                let other = if edge.source_id == walk.node_id {
                    edge.target_id.clone()
                } else {
                    edge.source_id.clone()
                };

                if walk.path.contains(&other) {
                    continue;
                }

                let mut extended = walk.clone();
                extended.node_id = other.clone();
                extended.path.push(other.clone());
                extended.relations.push(edge.relation_type.clone());
                extended.total_weight += edge.weight;

                if other == to_id {
                    finished.push(extended);
                } else {
                    next.push(extended);
                }
            }
        }
        frontier = next;
    }

    finished.sort_by(|a, b| {
        a.total_weight
            .partial_cmp(&b.total_weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    finished.truncate(MAX_PATHS);

    let mut ids: Vec<String> = finished
        .iter()
        .flat_map(|walk| walk.path.iter().skip(1).cloned())
        .collect();
    ids.sort();
    ids.dedup();

    let nodes = GraphNode::find_by_ids(db, &ids).await?;
    let by_id: HashMap<String, GraphNode> = nodes
        .into_iter()
        .map(|node| (node.id.clone(), node))
        .collect();

    Ok(finished
        .into_iter()
        .map(|walk| GraphPath {
            nodes: walk
                .path
                .iter()
                .skip(1)
                .filter_map(|id| by_id.get(id).cloned())
                .collect(),
            relations: walk.relations,
            total_weight: walk.total_weight,
        })
        .collect())
}
