//! Seams to the external collaborators of the retrieval engine.
//!
//! Implementations are opaque to the orchestrator: it only wraps their
//! failures with the stage they happened in and applies that stage's fallback.

use async_trait::async_trait;

use crate::types::{Chunk, ChunkFilter, ChunkId, VectorHit};

/// Turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Must return L2-normalized vectors, one per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Scores `(query, candidate)` pairs. Output is aligned with `candidates`
/// but carries no ordering guarantee.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Holds every chunk of the corpus, children and parents alike.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Chunks among `ids` that match `filter`. Unknown ids are skipped.
    async fn fetch(&self, ids: &[ChunkId], filter: &ChunkFilter) -> anyhow::Result<Vec<Chunk>>;
    /// Every chunk matching `filter`, in a stable order.
    async fn scan(&self, filter: &ChunkFilter) -> anyhow::Result<Vec<Chunk>>;
    /// Atomically swap the population of one document for `chunks`.
    async fn replace_document(&self, doc_id: &str, chunks: Vec<Chunk>) -> anyhow::Result<()>;
}

/// Nearest-neighbour search over stored chunk embeddings.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search_vec(&self, query: &[f32], k: usize, filter: &ChunkFilter) -> anyhow::Result<Vec<VectorHit>>;
}
