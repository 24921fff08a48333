//! Semantic retrieval over one snapshot's embeddings.
//!
//! Brute-force cosine similarity between the query vector and every
//! embedding in the snapshot — only that snapshot; a query can never see
//! another fingerprint's chunks. Results below `min_score` are dropped
//! (an empty result is a valid outcome, not an error), and equal scores
//! are broken by `(source_file, ordinal)` ascending so pagination is
//! deterministic.

use std::collections::HashMap;

use crate::models::{KnowledgeIndex, Retrieved};

/// Top-k chunks of `index` most similar to `query_vec`.
pub fn top_k(
    index: &KnowledgeIndex,
    query_vec: &[f32],
    k: usize,
    min_score: f32,
) -> Vec<Retrieved> {
    let by_id: HashMap<&str, &crate::models::Chunk> =
        index.chunks.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut scored: Vec<Retrieved> = index
        .embeddings
        .iter()
        .filter_map(|record| {
            let chunk = by_id.get(record.chunk_id.as_str())?;
            let score = cosine_similarity(query_vec, &record.vector);
            if score < min_score {
                return None;
            }
            Some(Retrieved {
                chunk: (*chunk).clone(),
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.source_file.cmp(&b.chunk.source_file))
            .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
    });
    scored.truncate(k);
    scored
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    use crate::models::{Chunk, EmbeddingRecord, HierarchyNode};

    fn chunk(id: &str, file: &str, ordinal: u64) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_file: file.to_string(),
            start_line: 1,
            end_line: 1,
            text: format!("chunk {id}"),
            ordinal,
        }
    }

    fn index_with(pairs: Vec<(Chunk, Vec<f32>)>) -> KnowledgeIndex {
        let (chunks, embeddings): (Vec<Chunk>, Vec<EmbeddingRecord>) = pairs
            .into_iter()
            .map(|(c, v)| {
                let record = EmbeddingRecord {
                    chunk_id: c.id.clone(),
                    vector: v,
                };
                (c, record)
            })
            .unzip();
        KnowledgeIndex {
            fingerprint: "fp".to_string(),
            files: Vec::new(),
            hierarchy: HierarchyNode {
                name: String::new(),
                path: String::new(),
                is_dir: true,
                children: Vec::new(),
            },
            dependencies: Vec::new(),
            chunks,
            embeddings,
            language_stats: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_degenerate() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_top_k_orders_by_score() {
        let index = index_with(vec![
            (chunk("a", "f1", 0), vec![1.0, 0.0]),
            (chunk("b", "f2", 0), vec![0.7, 0.7]),
            (chunk("c", "f3", 0), vec![0.0, 1.0]),
        ]);
        let results = top_k(&index, &[1.0, 0.0], 3, 0.0);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_threshold_filters_everything() {
        let index = index_with(vec![(chunk("a", "f1", 0), vec![0.0, 1.0])]);
        let results = top_k(&index, &[1.0, 0.0], 5, 0.5);
        assert!(results.is_empty());
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        // Identical vectors → identical scores; order must follow
        // (source_file, ordinal).
        let index = index_with(vec![
            (chunk("x", "zeta.py", 1), vec![1.0, 0.0]),
            (chunk("y", "alpha.py", 2), vec![1.0, 0.0]),
            (chunk("z", "alpha.py", 0), vec![1.0, 0.0]),
        ]);
        let results = top_k(&index, &[1.0, 0.0], 3, 0.0);
        let order: Vec<(&str, u64)> = results
            .iter()
            .map(|r| (r.chunk.source_file.as_str(), r.chunk.ordinal))
            .collect();
        assert_eq!(
            order,
            vec![("alpha.py", 0), ("alpha.py", 2), ("zeta.py", 1)]
        );
    }

    #[test]
    fn test_truncates_to_k() {
        let index = index_with(
            (0..10)
                .map(|i| (chunk(&format!("c{i}"), "f", i), vec![1.0, 0.0]))
                .collect(),
        );
        assert_eq!(top_k(&index, &[1.0, 0.0], 3, 0.0).len(), 3);
    }
}
