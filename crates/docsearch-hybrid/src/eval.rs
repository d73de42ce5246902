//! Offline retrieval evaluation: recall@k over `(doc_id, page)` and latency.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use docsearch_core::query::QueryRequest;

use crate::orchestrator::{elapsed_ms, QueryContext};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpectedCitation {
    pub doc_id: String,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub question: String,
    #[serde(default)]
    pub expected_citations: Vec<ExpectedCitation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub question: String,
    pub recall: f64,
    pub latency_ms: u64,
    pub retrieved: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub cases: usize,
    pub k: usize,
    pub mean_recall: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub items: Vec<CaseResult>,
}

pub fn load_testset(path: &Path) -> anyhow::Result<Vec<EvalCase>> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}

/// Share of `expected` found among the first `k` of `retrieved`. An empty
/// expectation is trivially satisfied.
pub fn recall_at_k(expected: &[ExpectedCitation], retrieved: &[(String, u32)], k: usize) -> f64 {
    if expected.is_empty() {
        return 1.0;
    }
    let top: HashSet<(&str, u32)> = retrieved.iter().take(k).map(|(d, p)| (d.as_str(), *p)).collect();
    let hits = expected.iter().filter(|e| top.contains(&(e.doc_id.as_str(), e.page))).count();
    hits as f64 / expected.len() as f64
}

/// Linear-interpolated percentile (`p` in 0..=100) of `values`.
pub fn percentile(values: &[u64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    let frac = rank - lo as f64;
    sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
}

/// Run every case through retrieval + rerank (rerank batch widened to `k`)
/// and score the reranked list.
pub async fn evaluate(ctx: &QueryContext, cases: &[EvalCase], k: usize) -> EvalReport {
    let retrieval = &ctx.settings().retrieval;
    let mut items = Vec::with_capacity(cases.len());
    for case in cases {
        let req = QueryRequest {
            question: case.question.clone(),
            top_k_dense: retrieval.top_k_dense,
            top_k_lexical: retrieval.top_k_lexical,
            rerank_top_k: k.max(retrieval.rerank_top_k),
        };
        let start = Instant::now();
        let result = ctx.retrieve(&req).await;
        let latency_ms = elapsed_ms(start);
        let retrieved: Vec<(String, u32)> = result.reranked.iter().map(|r| (r.chunk.doc_id.clone(), r.chunk.page)).collect();
        let recall = recall_at_k(&case.expected_citations, &retrieved, k);
        info!(question = %case.question, recall, latency_ms, "eval case");
        items.push(CaseResult { question: case.question.clone(), recall, latency_ms, retrieved: retrieved.len() });
    }
    let latencies: Vec<u64> = items.iter().map(|i| i.latency_ms).collect();
    let n = items.len().max(1) as f64;
    EvalReport {
        cases: items.len(),
        k,
        mean_recall: items.iter().map(|i| i.recall).sum::<f64>() / n,
        avg_latency_ms: latencies.iter().sum::<u64>() as f64 / n,
        p95_latency_ms: percentile(&latencies, 95.0),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(doc: &str, page: u32) -> ExpectedCitation { ExpectedCitation { doc_id: doc.into(), page } }

    #[test]
    fn recall_counts_doc_page_pairs_in_top_k() {
        let retrieved = vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)];
        assert_eq!(recall_at_k(&[exp("a", 1), exp("c", 3)], &retrieved, 2), 0.5);
        assert_eq!(recall_at_k(&[exp("a", 1), exp("c", 3)], &retrieved, 3), 1.0);
        assert_eq!(recall_at_k(&[exp("a", 2)], &retrieved, 3), 0.0);
    }

    #[test]
    fn empty_expectation_is_full_recall() {
        assert_eq!(recall_at_k(&[], &[], 20), 1.0);
    }

    #[test]
    fn percentile_interpolates() {
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[7], 95.0), 7.0);
        let v: Vec<u64> = (1..=100).collect();
        assert!((percentile(&v, 95.0) - 95.05).abs() < 1e-9);
        assert_eq!(percentile(&[10, 20], 50.0), 15.0);
    }

    #[test]
    fn testset_defaults_missing_expectations() {
        let cases: Vec<EvalCase> = serde_json::from_str(r#"[{"question":"q"}]"#).unwrap();
        assert!(cases[0].expected_citations.is_empty());
    }
}
