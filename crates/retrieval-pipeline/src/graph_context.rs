use std::collections::BTreeMap;
use std::fmt::Write as _;

use common::{
    error::AppError,
    retrieval::graph::{self, Direction, TraversalResult},
    storage::{db::SurrealDbClient, types::graph_node::GraphNode},
};
use tracing::instrument;

/// Traversal depth for entity neighborhoods.
pub const CONTEXT_TRAVERSAL_DEPTH: usize = 2;
/// Traversal depth for rendered subgraphs.
pub const SUBGRAPH_CONTEXT_DEPTH: usize = 1;
/// Hop limit for path searches between two entities.
pub const PATH_SEARCH_DEPTH: usize = 5;

/// Renders the depth-2 neighborhood around the named entities as prompt
/// context. Names that do not resolve are silently dropped; None when the
/// input is empty or nothing resolves.
#[instrument(skip(db))]
pub async fn get_context_for_entities(
    db: &SurrealDbClient,
    names: &[String],
) -> Result<Option<String>, AppError> {
    if names.is_empty() {
        return Ok(None);
    }

    let nodes = GraphNode::find_by_names(db, names).await?;
    if nodes.is_empty() {
        return Ok(None);
    }

    let ids: Vec<String> = nodes.iter().map(|node| node.id.clone()).collect();
    let traversal = graph::traverse_batch(db, &ids, CONTEXT_TRAVERSAL_DEPTH).await?;

    let resolved: Vec<&str> = nodes.iter().map(|node| node.name.as_str()).collect();
    let mut out = format!("Knowledge graph context for: {}\n", resolved.join(", "));

    for node in &nodes {
        if let Some(properties) = node.properties.as_object() {
            if !properties.is_empty() {
                let _ = writeln!(out, "{} properties: {}", node.name, node.properties);
            }
        }
    }

    let mut by_depth: BTreeMap<usize, Vec<&TraversalResult>> = BTreeMap::new();
    for row in &traversal {
        by_depth.entry(row.depth).or_default().push(row);
    }

    for (depth, rows) in by_depth {
        let _ = writeln!(out, "\nDepth {depth}:");
        for row in rows {
            let arrow = match row.direction {
                Direction::Outgoing => "→",
                Direction::Incoming => "←",
            };
            let _ = writeln!(
                out,
                "{arrow} [{}] {} ({})",
                row.relation_type, row.node.name, row.node.node_type
            );
        }
    }

    Ok(Some(out))
}

/// Renders up to five weighted paths between two named entities. None when
/// either name does not resolve or no path exists.
#[instrument(skip(db))]
pub async fn get_path_context(
    db: &SurrealDbClient,
    from_name: &str,
    to_name: &str,
) -> Result<Option<String>, AppError> {
    let from = GraphNode::find_by_name(db, from_name).await?;
    let to = GraphNode::find_by_name(db, to_name).await?;
    let (Some(from), Some(to)) = (from, to) else {
        return Ok(None);
    };

    let paths = graph::find_paths(db, &from.id, &to.id, PATH_SEARCH_DEPTH).await?;
    if paths.is_empty() {
        return Ok(None);
    }

    let mut out = format!("Paths from {} to {}:\n", from.name, to.name);
    for path in &paths {
        let mut line = from.name.clone();
        for (node, relation) in path.nodes.iter().zip(&path.relations) {
            let _ = write!(line, " -[{relation}]-> {}", node.name);
        }
        let _ = writeln!(out, "{line} (weight {:.2})", path.total_weight);
    }

    Ok(Some(out))
}

/// Renders the depth-1 induced subgraph around the named entities as a node
/// list plus labeled edges. Unresolved names are silently dropped.
#[instrument(skip(db))]
pub async fn get_subgraph_context(
    db: &SurrealDbClient,
    names: &[String],
) -> Result<Option<String>, AppError> {
    let nodes = GraphNode::find_by_names(db, names).await?;
    if nodes.is_empty() {
        return Ok(None);
    }

    let ids: Vec<String> = nodes.iter().map(|node| node.id.clone()).collect();
    let subgraph = graph::get_subgraph(db, &ids, SUBGRAPH_CONTEXT_DEPTH).await?;

    let names_by_id: BTreeMap<&str, &str> = subgraph
        .nodes
        .iter()
        .map(|node| (node.id.as_str(), node.name.as_str()))
        .collect();

    let mut out = String::from("Nodes:\n");
    for node in &subgraph.nodes {
        let _ = writeln!(out, "{} ({})", node.name, node.node_type);
    }

    if !subgraph.edges.is_empty() {
        out.push_str("\nEdges:\n");
        for edge in &subgraph.edges {
            if let (Some(source), Some(target)) = (
                names_by_id.get(edge.source_id.as_str()),
                names_by_id.get(edge.target_id.as_str()),
            ) {
                let _ = writeln!(out, "{source} -[{}]-> {target}", edge.relation_type);
            }
        }
    }

    Ok(Some(out))
}
