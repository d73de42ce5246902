//! Request/response surface of the query orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::Stage;
use crate::types::ChunkRef;

fn default_top_k_dense() -> usize { 20 }
fn default_top_k_lexical() -> usize { 20 }
fn default_rerank_top_k() -> usize { 25 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default = "default_top_k_dense")]
    pub top_k_dense: usize,
    #[serde(default = "default_top_k_lexical")]
    pub top_k_lexical: usize,
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k_dense: default_top_k_dense(),
            top_k_lexical: default_top_k_lexical(),
            rerank_top_k: default_rerank_top_k(),
        }
    }
}

/// Per-query retrieval state, decided once after both searches joined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Both modalities returned candidates; they are fused.
    Normal,
    /// Lexical index absent or empty; dense candidates go straight to reranking.
    DegradedLexical,
    /// Dense path failed or found nothing; lexical candidates go straight to reranking.
    DegradedDense,
    /// Neither modality returned anything.
    Empty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    Unavailable,
    Failed,
    TimedOut,
}

/// A recoverable problem that changed how the query was answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Degradation {
    pub stage: Stage,
    pub kind: DegradationKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Latency {
    pub total_ms: u64,
    /// Wall time of the joined lexical + dense fan-out.
    pub retrieval_ms: u64,
    /// Fusion, candidate hydration and reranking.
    pub rerank_ms: u64,
    pub lexical_ms: u64,
    pub dense_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub context_chunks: Vec<ChunkRef>,
    pub citation_chunks: Vec<ChunkRef>,
    pub latency: Latency,
    pub mode: RetrievalMode,
    pub status: QueryStatus,
    #[serde(default)]
    pub degradations: Vec<Degradation>,
}

impl QueryResponse {
    pub fn cancelled(total_ms: u64) -> Self {
        Self {
            context_chunks: Vec::new(),
            citation_chunks: Vec::new(),
            latency: Latency { total_ms, ..Latency::default() },
            mode: RetrievalMode::Empty,
            status: QueryStatus::Cancelled,
            degradations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.citation_chunks.is_empty() && self.context_chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_apply_on_deserialize() {
        let req: QueryRequest = serde_json::from_str(r#"{"question":"minimum wage"}"#).unwrap();
        assert_eq!(req, QueryRequest::new("minimum wage"));
        assert_eq!((req.top_k_dense, req.top_k_lexical, req.rerank_top_k), (20, 20, 25));
    }

    #[test]
    fn mode_serializes_snake_case() {
        let s = serde_json::to_string(&RetrievalMode::DegradedLexical).unwrap();
        assert_eq!(s, "\"degraded_lexical\"");
    }
}
