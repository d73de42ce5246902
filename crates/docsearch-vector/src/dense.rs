use std::sync::Arc;
use tracing::{debug, warn};

use docsearch_core::error::{Error, Result, Stage};
use docsearch_core::traits::VectorSearch;
use docsearch_core::types::{ChunkFilter, ChunkKind, RankedCandidate, ScoreStage};

/// Child-only semantic search over a `VectorSearch` backend.
///
/// The child filter is applied to every backend call, and anything the
/// backend returns that is not a child is dropped again here.
#[derive(Clone)]
pub struct DenseIndex {
	backend: Arc<dyn VectorSearch>,
	dim: usize,
}

impl DenseIndex {
	pub fn new(backend: Arc<dyn VectorSearch>, dim: usize) -> Self { Self { backend, dim } }

	pub fn dim(&self) -> usize { self.dim }

	/// Top `k` children by cosine similarity, best first.
	pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RankedCandidate>> {
		self.search_filtered(query, k, ChunkFilter::default()).await
	}

	/// Like `search`, narrowed by doc/page. The filter's kind is always
	/// overridden to children.
	pub async fn search_filtered(&self, query: &[f32], k: usize, filter: ChunkFilter) -> Result<Vec<RankedCandidate>> {
		if query.len() != self.dim {
			return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
		}
		if k == 0 {
			return Ok(Vec::new());
		}
		let filter = ChunkFilter { kind: Some(ChunkKind::Child), ..filter };
		let raw = self.backend.search_vec(query, k, &filter).await.map_err(|e| Error::upstream(Stage::Dense, e))?;
		let returned = raw.len();
		let mut hits: Vec<RankedCandidate> = raw
			.into_iter()
			.filter(|h| h.kind == ChunkKind::Child)
			.map(|h| RankedCandidate::new(h.id, h.score, ScoreStage::Dense))
			.collect();
		if hits.len() < returned {
			warn!(dropped = returned - hits.len(), "vector backend returned non-child rows");
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(k);
		debug!(k, hits = hits.len(), "dense search");
		Ok(hits)
	}
}
