//! Deterministic stand-ins for the neural models, used by tests and by
//! `models.use_fake` for running without weights.

use async_trait::async_trait;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use docsearch_core::traits::{Embedder, Reranker};

/// Feature-hashing embedder: each lowercased whitespace token adds a
/// pseudo-random weight to one bucket, then the vector is L2-normalized.
/// Texts sharing tokens get positive cosine similarity.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    max_len: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1), max_len: 256 } }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace().take(self.max_len) {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 { for x in &mut v { *x /= norm; } }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { self.max_len }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Scores a candidate by the share of distinct query words it contains.
#[derive(Debug, Clone, Default)]
pub struct TermOverlapReranker;

impl TermOverlapReranker {
    pub fn overlap(query: &str, candidate: &str) -> f32 {
        let words: HashSet<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() { return 0.0; }
        let text: HashSet<String> = candidate.split_whitespace().map(str::to_lowercase).collect();
        words.iter().filter(|w| text.contains(*w)).count() as f32 / words.len() as f32
    }
}

#[async_trait]
impl Reranker for TermOverlapReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>> {
        Ok(candidates.iter().map(|c| Self::overlap(query, c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[tokio::test]
    async fn hash_embeddings_are_normalized_and_deterministic() {
        let e = HashEmbedder::new(64);
        let out = e.embed_batch(&["hello world".into(), "hello world".into()]).await.unwrap();
        assert_eq!(out[0].len(), 64);
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-3, "norm={norm}");
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn shared_tokens_raise_similarity() {
        let e = HashEmbedder::new(256);
        let q = e.embed_one("minimum wage");
        let near = e.embed_one("the minimum wage rises");
        let far = e.embed_one("annual leave entitlement");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        assert!(HashEmbedder::new(8).embed_one("").iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn overlap_scores_align_with_candidates() {
        let r = TermOverlapReranker;
        let s = r.score("Minimum wage", &["minimum wage rules".into(), "leave".into(), "wage".into()]).await.unwrap();
        assert_eq!(s, vec![1.0, 0.0, 0.5]);
    }
}
