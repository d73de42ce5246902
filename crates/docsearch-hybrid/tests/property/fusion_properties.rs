use std::collections::HashSet;

use docsearch_core::types::{RankedCandidate, ScoreStage};
use docsearch_hybrid::fusion::{rrf, DEFAULT_RRF_K};
use proptest::prelude::*;

fn ranked(ids: &[String], stage: ScoreStage) -> Vec<RankedCandidate> {
    ids.iter().enumerate().map(|(i, id)| RankedCandidate::new(id.clone(), 1.0 / (i as f32 + 1.0), stage)).collect()
}

/// A list of distinct ids drawn from a small alphabet so the two lists overlap.
fn id_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-h][0-3]", 0..12).prop_map(|s| {
        let mut v: Vec<String> = s.into_iter().collect();
        v.sort();
        v
    })
}

proptest! {
    #[test]
    fn fusion_is_commutative(a in id_list(), b in id_list(), k in 1u32..200) {
        let ab = rrf(&ranked(&a, ScoreStage::Lexical), &ranked(&b, ScoreStage::Dense), k);
        let ba = rrf(&ranked(&b, ScoreStage::Lexical), &ranked(&a, ScoreStage::Dense), k);
        let ids_ab: Vec<&str> = ab.iter().map(|c| c.id.as_str()).collect();
        let ids_ba: Vec<&str> = ba.iter().map(|c| c.id.as_str()).collect();
        prop_assert_eq!(ids_ab, ids_ba);
        for (x, y) in ab.iter().zip(&ba) {
            prop_assert_eq!(x.score, y.score);
        }
    }

    #[test]
    fn fusion_is_deterministic(a in id_list(), b in id_list()) {
        let first = rrf(&ranked(&a, ScoreStage::Lexical), &ranked(&b, ScoreStage::Dense), DEFAULT_RRF_K);
        let second = rrf(&ranked(&a, ScoreStage::Lexical), &ranked(&b, ScoreStage::Dense), DEFAULT_RRF_K);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn output_is_the_union_without_duplicates(a in id_list(), b in id_list()) {
        let fused = rrf(&ranked(&a, ScoreStage::Lexical), &ranked(&b, ScoreStage::Dense), DEFAULT_RRF_K);
        let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
        let distinct: HashSet<&str> = ids.iter().copied().collect();
        let union: HashSet<&str> = a.iter().chain(&b).map(String::as_str).collect();
        prop_assert_eq!(ids.len(), distinct.len());
        prop_assert_eq!(distinct, union);
    }

    #[test]
    fn shared_items_outrank_single_list_items_at_equal_or_worse_rank(a in id_list(), b in id_list()) {
        let fused = rrf(&ranked(&a, ScoreStage::Lexical), &ranked(&b, ScoreStage::Dense), DEFAULT_RRF_K);
        let position = |id: &str| fused.iter().position(|c| c.id == id);
        for shared in fused.iter().filter(|c| c.lexical_rank.is_some() && c.dense_rank.is_some()) {
            for single in fused.iter().filter(|c| c.lexical_rank.is_none() || c.dense_rank.is_none()) {
                if single.best_rank() >= shared.best_rank() {
                    prop_assert!(position(&shared.id) < position(&single.id));
                }
            }
        }
    }

    #[test]
    fn one_empty_list_preserves_order(a in id_list()) {
        let fused = rrf(&[], &ranked(&a, ScoreStage::Dense), DEFAULT_RRF_K);
        let ids: Vec<String> = fused.into_iter().map(|c| c.id).collect();
        prop_assert_eq!(ids, a);
    }

    #[test]
    fn scores_are_non_increasing(a in id_list(), b in id_list()) {
        let fused = rrf(&ranked(&a, ScoreStage::Lexical), &ranked(&b, ScoreStage::Dense), DEFAULT_RRF_K);
        prop_assert!(fused.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
