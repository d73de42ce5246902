//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i), ranks 1-based.
//!
//! Lexical and dense scores live on unrelated scales, so only ranks are
//! combined. Chunk ids are the fusion key.

use std::cmp::Ordering;
use std::collections::HashMap;

use docsearch_core::types::{ChunkId, RankedCandidate, ScoreStage};

pub const DEFAULT_RRF_K: u32 = 60;

/// A candidate after fusion, with the ranks it held in each input list.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: ChunkId,
    pub score: f64,
    pub lexical_rank: Option<usize>,
    pub dense_rank: Option<usize>,
}

impl FusedCandidate {
    /// Lowest 1-based rank across both lists.
    pub fn best_rank(&self) -> usize {
        match (self.lexical_rank, self.dense_rank) {
            (Some(a), Some(b)) => a.min(b),
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => usize::MAX,
        }
    }

    pub fn to_ranked(&self) -> RankedCandidate {
        RankedCandidate::new(self.id.clone(), self.score as f32, ScoreStage::Fused)
    }
}

/// Fuse the lexical and dense rankings.
///
/// Output holds every id of either list exactly once, ordered by fused score
/// descending, then best individual rank, then id. A repeated id within one
/// list keeps its first (best) rank. With one list empty the other passes
/// through in its own order.
pub fn rrf(lexical: &[RankedCandidate], dense: &[RankedCandidate], k: u32) -> Vec<FusedCandidate> {
    let mut by_id: HashMap<&str, FusedCandidate> = HashMap::with_capacity(lexical.len() + dense.len());

    for (i, c) in lexical.iter().enumerate() {
        let entry = by_id.entry(c.id.as_str()).or_insert_with(|| empty(&c.id));
        entry.lexical_rank.get_or_insert(i + 1);
    }
    for (i, c) in dense.iter().enumerate() {
        let entry = by_id.entry(c.id.as_str()).or_insert_with(|| empty(&c.id));
        entry.dense_rank.get_or_insert(i + 1);
    }

    let k = f64::from(k);
    let mut fused: Vec<FusedCandidate> = by_id
        .into_values()
        .map(|mut c| {
            let contribution = |rank: Option<usize>| rank.map_or(0.0, |r| 1.0 / (k + r as f64));
            c.score = contribution(c.lexical_rank) + contribution(c.dense_rank);
            c
        })
        .collect();

    fused.sort_by(compare);
    fused
}

fn empty(id: &str) -> FusedCandidate {
    FusedCandidate { id: id.to_string(), score: 0.0, lexical_rank: None, dense_rank: None }
}

fn compare(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.best_rank().cmp(&b.best_rank()))
        .then_with(|| a.id.cmp(&b.id))
}
