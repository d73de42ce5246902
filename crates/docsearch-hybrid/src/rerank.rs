use std::time::{Duration, Instant};
use tracing::{debug, error};

use docsearch_core::error::{Error, Stage};
use docsearch_core::query::{Degradation, DegradationKind};
use docsearch_core::traits::Reranker;
use docsearch_core::types::{Chunk, RankedCandidate, ScoreStage};

/// Score given to every candidate when reranking is skipped.
pub const FALLBACK_SCORE: f32 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RerankedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl RerankedChunk {
    pub fn to_ranked(&self) -> RankedCandidate {
        RankedCandidate::new(self.chunk.id.clone(), self.score, ScoreStage::Rerank)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    pub ranked: Vec<RerankedChunk>,
    pub degradation: Option<Degradation>,
}

/// Keep the incoming (fusion) order with a constant score.
pub fn fallback(candidates: Vec<Chunk>, degradation: Degradation) -> RerankOutcome {
    error!(stage = %Stage::Rerank, kind = ?degradation.kind, message = %degradation.message, "rerank fell back to fusion order");
    RerankOutcome {
        ranked: candidates.into_iter().map(|chunk| RerankedChunk { chunk, score: FALLBACK_SCORE }).collect(),
        degradation: Some(degradation),
    }
}

pub fn degradation(kind: DegradationKind, err: &Error) -> Degradation {
    Degradation { stage: Stage::Rerank, kind, message: err.to_string() }
}

/// Score `candidates` against `query` in one batched call and sort them by
/// score, descending. Equal scores keep the incoming order. A failed, slow,
/// misaligned or NaN-producing scorer yields the fusion-order fallback.
pub async fn rerank(reranker: &dyn Reranker, query: &str, candidates: Vec<Chunk>, timeout: Duration) -> RerankOutcome {
    if candidates.is_empty() {
        return RerankOutcome::default();
    }
    let start = Instant::now();
    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let scores = match tokio::time::timeout(timeout, reranker.score(query, &texts)).await {
        Ok(Ok(scores)) => scores,
        Ok(Err(e)) => return fallback(candidates, degradation(DegradationKind::Failed, &Error::upstream(Stage::Rerank, e))),
        Err(_) => {
            let err = Error::Timeout { stage: Stage::Rerank, elapsed: start.elapsed() };
            return fallback(candidates, degradation(DegradationKind::TimedOut, &err));
        }
    };
    if scores.len() != candidates.len() {
        let err = Error::upstream(Stage::Rerank, format!("{} scores for {} candidates", scores.len(), candidates.len()));
        return fallback(candidates, degradation(DegradationKind::Failed, &err));
    }
    if scores.iter().any(|s| s.is_nan()) {
        return fallback(candidates, degradation(DegradationKind::Failed, &Error::upstream(Stage::Rerank, "scorer returned NaN")));
    }
    let mut ranked: Vec<RerankedChunk> =
        candidates.into_iter().zip(scores).map(|(chunk, score)| RerankedChunk { chunk, score }).collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    debug!(candidates = ranked.len(), elapsed_ms = start.elapsed().as_millis() as u64, "reranked");
    RerankOutcome { ranked, degradation: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(Vec<f32>);

    #[async_trait]
    impl Reranker for Fixed {
        async fn score(&self, _q: &str, _c: &[String]) -> anyhow::Result<Vec<f32>> { Ok(self.0.clone()) }
    }

    struct Broken;

    #[async_trait]
    impl Reranker for Broken {
        async fn score(&self, _q: &str, _c: &[String]) -> anyhow::Result<Vec<f32>> { anyhow::bail!("model crashed") }
    }

    struct Slow;

    #[async_trait]
    impl Reranker for Slow {
        async fn score(&self, _q: &str, c: &[String]) -> anyhow::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![1.0; c.len()])
        }
    }

    fn chunks(ids: &[&str]) -> Vec<Chunk> {
        ids.iter().map(|id| Chunk::child(*id, "p", "d", 1, format!("text {id}"))).collect()
    }

    fn ids(o: &RerankOutcome) -> Vec<&str> { o.ranked.iter().map(|r| r.chunk.id.as_str()).collect() }

    #[tokio::test]
    async fn sorts_by_score_and_keeps_fusion_order_on_ties() {
        let out = rerank(&Fixed(vec![0.2, 0.9, 0.2, 0.5]), "q", chunks(&["a", "b", "c", "d"]), Duration::from_secs(1)).await;
        assert_eq!(ids(&out), vec!["b", "d", "a", "c"]);
        assert!(out.degradation.is_none());
        assert_eq!(out.ranked[0].to_ranked().stage, ScoreStage::Rerank);
    }

    #[tokio::test]
    async fn failure_falls_back_to_fusion_order() {
        let out = rerank(&Broken, "q", chunks(&["a", "b"]), Duration::from_secs(1)).await;
        assert_eq!(ids(&out), vec!["a", "b"]);
        assert!(out.ranked.iter().all(|r| r.score == FALLBACK_SCORE));
        let d = out.degradation.unwrap();
        assert_eq!((d.stage, d.kind), (Stage::Rerank, DegradationKind::Failed));
    }

    #[tokio::test]
    async fn misaligned_scores_fall_back() {
        let out = rerank(&Fixed(vec![0.1]), "q", chunks(&["a", "b"]), Duration::from_secs(1)).await;
        assert_eq!(ids(&out), vec!["a", "b"]);
        assert!(out.degradation.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back() {
        let out = rerank(&Slow, "q", chunks(&["a", "b"]), Duration::from_millis(50)).await;
        assert_eq!(ids(&out), vec!["a", "b"]);
        assert_eq!(out.degradation.unwrap().kind, DegradationKind::TimedOut);
    }

    #[tokio::test]
    async fn empty_batch_skips_scorer() {
        let out = rerank(&Broken, "q", Vec::new(), Duration::from_secs(1)).await;
        assert!(out.ranked.is_empty() && out.degradation.is_none());
    }
}
