//! Query orchestration: concurrent lexical + dense retrieval, mode decision,
//! fusion, candidate hydration, reranking and parent resolution.
//!
//! Nothing in the query path returns an error to the caller. Every stage
//! failure is mapped to that stage's fallback and reported in the response's
//! `degradations`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use docsearch_core::config::Settings;
use docsearch_core::error::{Error, Stage};
use docsearch_core::query::{Degradation, DegradationKind, Latency, QueryRequest, QueryResponse, QueryStatus, RetrievalMode};
use docsearch_core::traits::{ChunkStore, Embedder, Reranker};
use docsearch_core::types::{Chunk, ChunkFilter, ChunkId, RankedCandidate};
use docsearch_embed::{load_embedder, load_reranker};
use docsearch_text::{LexicalIndexHandle, LexicalStatus};
use docsearch_vector::{DenseIndex, LanceChunkStore};

use crate::fusion::{rrf, FusedCandidate};
use crate::models::LazyModel;
use crate::rerank::{self, rerank, RerankedChunk};
use crate::resolver::resolve_parents;

pub(crate) fn elapsed_ms(start: Instant) -> u64 { start.elapsed().as_millis() as u64 }

/// Record a stage failure: warn for unavailability, error otherwise.
pub(crate) fn degrade(stage: Stage, kind: DegradationKind, err: &Error) -> Degradation {
    match kind {
        DegradationKind::Unavailable => warn!(stage = %stage, error = %err, "stage unavailable, continuing degraded"),
        DegradationKind::Failed | DegradationKind::TimedOut => error!(stage = %stage, kind = ?kind, error = %err, "stage failed, applying fallback"),
    }
    Degradation { stage, kind, message: err.to_string() }
}

/// Result of one retrieval modality.
struct StageOutput {
    hits: Vec<RankedCandidate>,
    elapsed_ms: u64,
    degradation: Option<Degradation>,
}

impl StageOutput {
    fn ok(start: Instant, hits: Vec<RankedCandidate>) -> Self { Self { hits, elapsed_ms: elapsed_ms(start), degradation: None } }

    fn degraded(start: Instant, stage: Stage, kind: DegradationKind, err: Error) -> Self {
        Self { hits: Vec::new(), elapsed_ms: elapsed_ms(start), degradation: Some(degrade(stage, kind, &err)) }
    }
}

/// Reranked children before the citation cap, as used by evaluation.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub mode: RetrievalMode,
    pub reranked: Vec<RerankedChunk>,
    pub degradations: Vec<Degradation>,
    /// `total_ms` is left at zero; `query` fills it in.
    pub latency: Latency,
}

/// Explicit initialization state of the shared handles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Readiness {
    pub lexical: LexicalStatus,
    pub embedder_initialized: bool,
    pub reranker_initialized: bool,
    pub reindex_in_progress: bool,
}

/// Everything a query needs, built once at startup and shared by reference.
pub struct QueryContext {
    pub(crate) settings: Settings,
    pub(crate) lexical: Arc<LexicalIndexHandle>,
    pub(crate) lexical_dir: Option<PathBuf>,
    pub(crate) dense: DenseIndex,
    pub(crate) store: Arc<dyn ChunkStore>,
    pub(crate) embedder: LazyModel<dyn Embedder>,
    pub(crate) reranker: LazyModel<dyn Reranker>,
    pub(crate) reindex_lock: Mutex<()>,
}

impl QueryContext {
    pub fn new(
        settings: Settings,
        lexical: Arc<LexicalIndexHandle>,
        dense: DenseIndex,
        store: Arc<dyn ChunkStore>,
        embedder: LazyModel<dyn Embedder>,
        reranker: LazyModel<dyn Reranker>,
    ) -> Self {
        Self { settings, lexical, lexical_dir: None, dense, store, embedder, reranker, reindex_lock: Mutex::new(()) }
    }

    /// Persist rebuilt lexical indexes under `dir`.
    pub fn with_lexical_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lexical_dir = Some(dir.into());
        self
    }

    /// Production wiring from settings: LanceDB store, lexical index loaded
    /// from disk, models loaded lazily on first use.
    pub async fn open(settings: Settings) -> anyhow::Result<Self> {
        settings.validate()?;
        let dim = settings.models.embedding_dim;
        let lexical_dir = settings.paths.lexical_index_dir();
        let lexical = Arc::new(LexicalIndexHandle::open(&lexical_dir));
        let lance_uri = settings.paths.lancedb_dir().to_string_lossy().to_string();
        let store = Arc::new(LanceChunkStore::open(&lance_uri, &settings.paths.table, dim).await?);
        let dense = DenseIndex::new(store.clone(), dim);
        let models = settings.models.clone();
        let embedder = LazyModel::<dyn Embedder>::new("embedder", Arc::new(move || load_embedder(&models)));
        let models = settings.models.clone();
        let reranker = LazyModel::<dyn Reranker>::new("reranker", Arc::new(move || load_reranker(&models)));
        info!(lance = %lance_uri, lexical = %lexical_dir.display(), dim, "query context opened");
        Ok(Self::new(settings, lexical, dense, store, embedder, reranker).with_lexical_dir(lexical_dir))
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn lexical(&self) -> &LexicalIndexHandle { &self.lexical }

    pub fn store(&self) -> &Arc<dyn ChunkStore> { &self.store }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            lexical: self.lexical.status(),
            embedder_initialized: self.embedder.is_initialized(),
            reranker_initialized: self.reranker.is_initialized(),
            reindex_in_progress: self.reindex_lock.try_lock().is_err(),
        }
    }

    /// Force model initialization so the first query does not pay for it.
    pub async fn warm_up(&self) -> anyhow::Result<()> {
        self.embedder.get().await?;
        self.reranker.get().await?;
        Ok(())
    }

    async fn lexical_stage(&self, question: &str, k: usize) -> StageOutput {
        let start = Instant::now();
        if k == 0 {
            return StageOutput::ok(start, Vec::new());
        }
        let Some(index) = self.lexical.current() else {
            let err = Error::IndexUnavailable(format!("lexical index is {:?}", self.lexical.status()));
            return StageOutput::degraded(start, Stage::Lexical, DegradationKind::Unavailable, err);
        };
        let query = question.to_string();
        let task = tokio::task::spawn_blocking(move || index.search(&query, k));
        match tokio::time::timeout(self.settings.timeouts.lexical(), task).await {
            Ok(Ok(Ok(hits))) => {
                debug!(stage = %Stage::Lexical, hits = hits.len(), "lexical search");
                StageOutput::ok(start, hits)
            }
            Ok(Ok(Err(err))) => StageOutput::degraded(start, Stage::Lexical, DegradationKind::Failed, err),
            Ok(Err(join)) => StageOutput::degraded(start, Stage::Lexical, DegradationKind::Failed, Error::upstream(Stage::Lexical, join)),
            Err(_) => {
                let err = Error::Timeout { stage: Stage::Lexical, elapsed: start.elapsed() };
                StageOutput::degraded(start, Stage::Lexical, DegradationKind::TimedOut, err)
            }
        }
    }

    async fn dense_stage(&self, question: &str, k: usize) -> StageOutput {
        let start = Instant::now();
        if k == 0 {
            return StageOutput::ok(start, Vec::new());
        }
        let embedder = match self.embedder.get().await {
            Ok(e) => e,
            Err(e) => return StageOutput::degraded(start, Stage::Embedding, DegradationKind::Unavailable, Error::upstream(Stage::Embedding, e)),
        };
        let vector = match tokio::time::timeout(self.settings.timeouts.embedding(), embedder.embed_query(question)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return StageOutput::degraded(start, Stage::Embedding, DegradationKind::Failed, Error::upstream(Stage::Embedding, e)),
            Err(_) => {
                let err = Error::Timeout { stage: Stage::Embedding, elapsed: start.elapsed() };
                return StageOutput::degraded(start, Stage::Embedding, DegradationKind::TimedOut, err);
            }
        };
        let dense_start = Instant::now();
        match tokio::time::timeout(self.settings.timeouts.dense(), self.dense.search(&vector, k)).await {
            Ok(Ok(hits)) => StageOutput::ok(start, hits),
            Ok(Err(err)) => StageOutput::degraded(start, Stage::Dense, DegradationKind::Failed, err),
            Err(_) => {
                let err = Error::Timeout { stage: Stage::Dense, elapsed: dense_start.elapsed() };
                StageOutput::degraded(start, Stage::Dense, DegradationKind::TimedOut, err)
            }
        }
    }

    /// Fetch candidate children in candidate order. Ids the store cannot
    /// return are dropped.
    async fn hydrate(&self, candidates: &[RankedCandidate]) -> Result<Vec<Chunk>, Degradation> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ChunkId> = candidates.iter().map(|c| c.id.clone()).collect();
        let start = Instant::now();
        let fetched = match tokio::time::timeout(self.settings.timeouts.chunk_fetch(), self.store.fetch(&ids, &ChunkFilter::children())).await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => return Err(degrade(Stage::ChunkFetch, DegradationKind::Failed, &Error::upstream(Stage::ChunkFetch, e))),
            Err(_) => {
                let err = Error::Timeout { stage: Stage::ChunkFetch, elapsed: start.elapsed() };
                return Err(degrade(Stage::ChunkFetch, DegradationKind::TimedOut, &err));
            }
        };
        let mut by_id: HashMap<ChunkId, Chunk> = fetched.into_iter().map(|c| (c.id.clone(), c)).collect();
        let chunks: Vec<Chunk> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        if chunks.len() < ids.len() {
            warn!(stage = %Stage::ChunkFetch, missing = ids.len() - chunks.len(), "candidates missing from chunk store, dropped");
        }
        Ok(chunks)
    }

    /// Retrieve, fuse and rerank, without the citation cap or parent
    /// resolution.
    pub async fn retrieve(&self, req: &QueryRequest) -> Retrieval {
        let start = Instant::now();
        let question = req.question.trim();
        let mut latency = Latency::default();
        if question.is_empty() {
            debug!("blank question, nothing to retrieve");
            return Retrieval { mode: RetrievalMode::Empty, reranked: Vec::new(), degradations: Vec::new(), latency };
        }

        let (lexical, dense) = tokio::join!(self.lexical_stage(question, req.top_k_lexical), self.dense_stage(question, req.top_k_dense));
        latency.retrieval_ms = elapsed_ms(start);
        latency.lexical_ms = lexical.elapsed_ms;
        latency.dense_ms = dense.elapsed_ms;
        let mut degradations: Vec<Degradation> = lexical.degradation.into_iter().chain(dense.degradation).collect();

        let (mode, mut candidates) = match (lexical.hits.is_empty(), dense.hits.is_empty()) {
            (false, false) => {
                let fused = rrf(&lexical.hits, &dense.hits, self.settings.retrieval.rrf_k);
                (RetrievalMode::Normal, fused.iter().map(FusedCandidate::to_ranked).collect())
            }
            (true, false) => (RetrievalMode::DegradedLexical, dense.hits),
            (false, true) => (RetrievalMode::DegradedDense, lexical.hits),
            (true, true) => (RetrievalMode::Empty, Vec::new()),
        };
        debug!(mode = ?mode, candidates = candidates.len(), "retrieval joined");
        candidates.truncate(req.rerank_top_k);
        if candidates.is_empty() {
            return Retrieval { mode, reranked: Vec::new(), degradations, latency };
        }

        let rerank_start = Instant::now();
        let chunks = match self.hydrate(&candidates).await {
            Ok(chunks) => chunks,
            Err(d) => {
                degradations.push(d);
                latency.rerank_ms = elapsed_ms(rerank_start);
                return Retrieval { mode, reranked: Vec::new(), degradations, latency };
            }
        };
        let outcome = match self.reranker.get().await {
            Ok(reranker) => rerank(reranker.as_ref(), question, chunks, self.settings.timeouts.rerank()).await,
            Err(e) => {
                let err = Error::upstream(Stage::Rerank, e);
                rerank::fallback(chunks, rerank::degradation(DegradationKind::Unavailable, &err))
            }
        };
        degradations.extend(outcome.degradation);
        latency.rerank_ms = elapsed_ms(rerank_start);
        Retrieval { mode, reranked: outcome.ranked, degradations, latency }
    }

    /// Answer one query end to end.
    pub async fn query(&self, req: &QueryRequest) -> QueryResponse {
        let start = Instant::now();
        let Retrieval { mode, reranked, mut degradations, mut latency } = self.retrieve(req).await;
        let citations: Vec<Chunk> = reranked.into_iter().take(self.settings.retrieval.citation_cap).map(|r| r.chunk).collect();
        let resolved = resolve_parents(self.store.as_ref(), &citations, self.settings.timeouts.parent_fetch()).await;
        degradations.extend(resolved.degradation);
        latency.total_ms = elapsed_ms(start);
        info!(
            mode = ?mode,
            citations = citations.len(),
            context = resolved.context.len(),
            orphans = resolved.orphans.len(),
            total_ms = latency.total_ms,
            retrieval_ms = latency.retrieval_ms,
            rerank_ms = latency.rerank_ms,
            lexical_ms = latency.lexical_ms,
            dense_ms = latency.dense_ms,
            degradations = degradations.len(),
            "query answered"
        );
        QueryResponse {
            context_chunks: resolved.context.iter().map(Chunk::to_ref).collect(),
            citation_chunks: citations.iter().map(Chunk::to_ref).collect(),
            latency,
            mode,
            status: QueryStatus::Completed,
            degradations,
        }
    }

    /// `query`, abandoned as soon as `token` is cancelled. Pending stages are
    /// dropped and no partial result is returned.
    pub async fn query_with_cancel(&self, req: &QueryRequest, token: &CancellationToken) -> QueryResponse {
        let start = Instant::now();
        tokio::select! {
            biased;
            () = token.cancelled() => {
                info!(elapsed_ms = elapsed_ms(start), "query cancelled");
                QueryResponse::cancelled(elapsed_ms(start))
            }
            resp = self.query(req) => resp,
        }
    }
}
