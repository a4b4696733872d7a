use std::cmp::Ordering;
use std::sync::Arc;

use crate::types::{CatalogItem, ScoredResult};

/// Cosine similarity scaled to a percentage and clamped into `[0, 100]`.
/// A zero-norm vector on either side scores 0.
pub fn similarity_percent(a: &[f32], b: &[f32]) -> f32 {
    // Accumulate in f64 so extreme f32 components neither overflow nor underflow
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum();
    let norm_a: f64 = a.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a * norm_b) * 100.0;
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, 100.0) as f32
}

/// A catalog item paired with its embedding, in catalog order.
pub struct Candidate<V> {
    pub item: Arc<CatalogItem>,
    pub embedding: V,
}

/// Score every candidate against `query`, drop `exclude_id`, and return the
/// best `limit` results. Equal scores keep their input order.
pub fn rank<V: AsRef<[f32]>>(
    query: &[f32],
    candidates: impl IntoIterator<Item = Candidate<V>>,
    exclude_id: Option<&str>,
    limit: usize,
) -> Vec<ScoredResult> {
    let mut scored: Vec<ScoredResult> = candidates
        .into_iter()
        .filter(|c| exclude_id != Some(c.item.id.as_str()))
        .map(|c| ScoredResult {
            similarity: similarity_percent(query, c.embedding.as_ref()),
            item: c.item,
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::catalog_item;

    fn candidates(vectors: &[(&str, Vec<f32>)]) -> Vec<Candidate<Vec<f32>>> {
        vectors
            .iter()
            .map(|(id, v)| Candidate {
                item: Arc::new(catalog_item(id, "")),
                embedding: v.clone(),
            })
            .collect()
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.item.id.as_str()).collect()
    }

    #[test]
    fn test_toy_scenario_excludes_query_item() {
        let set = candidates(&[
            ("A", vec![1.0, 0.0]),
            ("B", vec![0.0, 1.0]),
            ("C", vec![1.0, 0.0]),
        ]);
        let results = rank(&[1.0, 0.0], set, Some("A"), 20);

        assert_eq!(ids(&results), vec!["C", "B"]);
        assert!((results[0].similarity - 100.0).abs() < 1e-4);
        assert_eq!(results[1].similarity, 0.0);
    }

    #[test]
    fn test_identical_vectors_score_100() {
        let v = [0.2, 0.7, 0.1];
        assert!((similarity_percent(&v, &v) - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_norm_scores_zero() {
        assert_eq!(similarity_percent(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(similarity_percent(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let pairs: [(&[f32], &[f32]); 3] = [
            (&[1.0, 0.0], &[-1.0, 0.0]),
            (&[3.0, -2.0], &[-1.0, 5.0]),
            (&[0.3, 0.4], &[0.4, 0.3]),
        ];
        for (a, b) in pairs {
            let s = similarity_percent(a, b);
            assert!((0.0..=100.0).contains(&s), "{} out of range", s);
        }
    }

    #[test]
    fn test_extreme_magnitudes_score_100_when_identical() {
        let vectors: [&[f32]; 4] = [
            &[1e20, 1e20],
            &[1e30, -1e30, 1e30],
            &[1e-20, 1e-20],
            &[1e-25, 1e-25],
        ];
        for v in vectors {
            let s = similarity_percent(v, v);
            assert!((s - 100.0).abs() < 1e-3, "{:?} scored {}", v, s);
        }
        assert_eq!(similarity_percent(&[1e30, 0.0], &[0.0, 1e30]), 0.0);
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let set = candidates(&[
            ("x", vec![0.0, 1.0]),
            ("y", vec![1.0, 0.0]),
            ("z", vec![0.0, 3.0]),
            ("w", vec![1.0, 0.0]),
        ]);
        let results = rank(&[1.0, 0.0], set, None, 20);
        assert_eq!(ids(&results), vec!["y", "w", "x", "z"]);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let vectors: Vec<(String, Vec<f32>)> = (0..30)
            .map(|i| (format!("p{}", i), vec![(i % 7) as f32, (i % 3) as f32, 1.0]))
            .collect();
        let as_refs: Vec<(&str, Vec<f32>)> =
            vectors.iter().map(|(id, v)| (id.as_str(), v.clone())).collect();

        let first = rank(&[1.0, 2.0, 0.5], candidates(&as_refs), None, 20);
        let second = rank(&[1.0, 2.0, 0.5], candidates(&as_refs), None, 20);

        assert_eq!(ids(&first), ids(&second));
        let scores = |r: &[ScoredResult]| r.iter().map(|s| s.similarity).collect::<Vec<_>>();
        assert_eq!(scores(&first), scores(&second));
    }

    #[test]
    fn test_top_k_cap_sorted_descending() {
        let vectors: Vec<(String, Vec<f32>)> = (0..50)
            .map(|i| (format!("p{}", i), vec![1.0, i as f32 / 10.0]))
            .collect();
        let as_refs: Vec<(&str, Vec<f32>)> =
            vectors.iter().map(|(id, v)| (id.as_str(), v.clone())).collect();

        let results = rank(&[1.0, 0.0], candidates(&as_refs), None, 20);
        assert_eq!(results.len(), 20);
        assert!(results
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(results[0].item.id, "p0");
    }

    #[test]
    fn test_fewer_candidates_than_limit() {
        let set = candidates(&[("a", vec![1.0]), ("b", vec![2.0])]);
        assert_eq!(rank(&[1.0], set, None, 20).len(), 2);
        let empty: Vec<Candidate<Vec<f32>>> = Vec::new();
        assert!(rank(&[1.0], empty, None, 20).is_empty());
    }
}
