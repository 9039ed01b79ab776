use std::collections::HashMap;

use common::storage::types::document::Document;
use serde::Serialize;

use crate::{fts::TextHit, vector::VectorHit};

/// Reciprocal Rank Fusion constant.
pub const RRF_K: f64 = 60.0;

/// Subscores gathered from the two retrieval branches.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Scores {
    pub vector: Option<f32>,
    pub text: Option<f32>,
}

/// A fused retrieval result: the item, its per-branch subscores, and the
/// RRF score used for ranking.
#[derive(Debug, Clone, Serialize)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
    pub fused: f64,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
            fused: 0.0,
        }
    }
}

pub fn distance_to_similarity(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    1.0 / (1.0 + distance.max(0.0))
}

/// Fuses the two ranked lists: every list contributes `1 / (RRF_K + rank)`
/// (1-based rank) for each document it contains, contributions sum for
/// documents present in both, and the merged list is sorted by fused score
/// descending and truncated to `k`. Ties keep first-insertion order, so the
/// ordering is stable within a call.
pub fn reciprocal_rank_fusion(
    vector_hits: Vec<VectorHit>,
    text_hits: Vec<TextHit>,
    k: usize,
) -> Vec<Scored<Document>> {
    let mut fused: Vec<Scored<Document>> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for (rank, hit) in vector_hits.into_iter().enumerate() {
        let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
        let index = *index_by_id
            .entry(hit.document.id.clone())
            .or_insert_with(|| {
                fused.push(Scored::new(hit.document));
                fused.len() - 1
            });
        fused[index].scores.vector = Some(hit.vector_score);
        fused[index].fused += contribution;
    }

    for (rank, hit) in text_hits.into_iter().enumerate() {
        let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
        let index = *index_by_id
            .entry(hit.document.id.clone())
            .or_insert_with(|| {
                fused.push(Scored::new(hit.document));
                fused.len() - 1
            });
        fused[index].scores.text = Some(hit.text_score);
        fused[index].fused += contribution;
    }

    // Stable sort: equal scores preserve insertion order.
    fused.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        let mut document = Document::new(format!("content of {id}"));
        document.id = id.to_string();
        document
    }

    fn vector_hit(id: &str, distance: f32) -> VectorHit {
        VectorHit {
            document: doc(id),
            distance,
            vector_score: distance_to_similarity(distance),
        }
    }

    fn text_hit(id: &str, score: f32) -> TextHit {
        TextHit {
            document: doc(id),
            text_score: score,
        }
    }

    #[test]
    fn test_distance_to_similarity() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(1.0), 0.5);
        assert_eq!(distance_to_similarity(f32::NAN), 0.0);
        assert_eq!(distance_to_similarity(-1.0), 1.0);
    }

    #[test]
    fn test_fusion_order_and_scores() {
        // Vector returns [A, B], text returns [B, C]:
        // B = 1/62 + 1/61, A = 1/61, C = 1/62.
        let fused = reciprocal_rank_fusion(
            vec![vector_hit("A", 0.1), vector_hit("B", 0.2)],
            vec![text_hit("B", 3.0), text_hit("C", 2.0)],
            10,
        );

        let order: Vec<&str> = fused.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);

        assert!((fused[0].fused - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((fused[1].fused - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[2].fused - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_list_score_is_reciprocal_rank() {
        let fused = reciprocal_rank_fusion(
            vec![vector_hit("A", 0.0), vector_hit("B", 1.0), vector_hit("C", 2.0)],
            Vec::new(),
            10,
        );

        for (rank, scored) in fused.iter().enumerate() {
            let expected = 1.0 / (60.0 + (rank + 1) as f64);
            assert!((scored.fused - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_subscores_are_carried() {
        let fused = reciprocal_rank_fusion(
            vec![vector_hit("A", 1.0)],
            vec![text_hit("A", 7.5)],
            10,
        );

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].scores.vector, Some(0.5));
        assert_eq!(fused[0].scores.text, Some(7.5));
    }

    #[test]
    fn test_truncates_to_k() {
        let fused = reciprocal_rank_fusion(
            vec![vector_hit("A", 0.0), vector_hit("B", 1.0), vector_hit("C", 2.0)],
            Vec::new(),
            2,
        );
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        // Two documents that only appear in one list each, at the same rank.
        let fused = reciprocal_rank_fusion(
            vec![vector_hit("A", 0.0)],
            vec![text_hit("B", 1.0)],
            10,
        );
        let order: Vec<&str> = fused.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(order, vec!["A", "B"]);
    }
}
