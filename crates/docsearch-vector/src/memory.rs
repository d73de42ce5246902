use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use docsearch_core::traits::{ChunkStore, VectorSearch};
use docsearch_core::types::{Chunk, ChunkFilter, ChunkId, VectorHit};

/// Cosine similarity in `[-1, 1]`; zero when either side has no magnitude.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		na += x * x;
		nb += y * y;
	}
	if na == 0.0 || nb == 0.0 { return 0.0; }
	(dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0)
}

/// Chunk store and brute-force vector search over one in-process vector.
///
/// Insertion order is the scan order. Replacing a document happens under a
/// single write lock, so readers see either the old or the new population.
#[derive(Default)]
pub struct InMemoryChunkStore {
	chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryChunkStore {
	pub fn new(chunks: Vec<Chunk>) -> Self { Self { chunks: RwLock::new(chunks) } }

	pub fn len(&self) -> usize { self.chunks.read().unwrap_or_else(|p| p.into_inner()).len() }

	pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
	async fn fetch(&self, ids: &[ChunkId], filter: &ChunkFilter) -> Result<Vec<Chunk>> {
		let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
		let guard = self.chunks.read().unwrap_or_else(|p| p.into_inner());
		Ok(guard.iter().filter(|c| wanted.contains(c.id.as_str()) && filter.matches(c)).cloned().collect())
	}

	async fn scan(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>> {
		let guard = self.chunks.read().unwrap_or_else(|p| p.into_inner());
		Ok(guard.iter().filter(|c| filter.matches(c)).cloned().collect())
	}

	async fn replace_document(&self, doc_id: &str, chunks: Vec<Chunk>) -> Result<()> {
		for c in &chunks {
			c.validate()?;
			anyhow::ensure!(c.doc_id == doc_id, "chunk '{}' belongs to '{}', not '{doc_id}'", c.id, c.doc_id);
		}
		let mut guard = self.chunks.write().unwrap_or_else(|p| p.into_inner());
		guard.retain(|c| c.doc_id != doc_id);
		guard.extend(chunks);
		Ok(())
	}
}

#[async_trait]
impl VectorSearch for InMemoryChunkStore {
	async fn search_vec(&self, query: &[f32], k: usize, filter: &ChunkFilter) -> Result<Vec<VectorHit>> {
		let guard = self.chunks.read().unwrap_or_else(|p| p.into_inner());
		let mut hits: Vec<VectorHit> = guard
			.iter()
			.filter(|c| filter.matches(c))
			.filter_map(|c| c.embedding.as_ref().map(|e| VectorHit { id: c.id.clone(), kind: c.kind, score: cosine(query, e) }))
			.collect();
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(k);
		Ok(hits)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store() -> InMemoryChunkStore {
		InMemoryChunkStore::new(vec![
			Chunk::parent("p1", "a", 1, "parent"),
			Chunk::child("c1", "p1", "a", 1, "one").with_embedding(vec![1.0, 0.0]),
			Chunk::child("c2", "p1", "a", 2, "two").with_embedding(vec![0.0, 1.0]),
			Chunk::child("c3", "p9", "b", 1, "three").with_embedding(vec![0.6, 0.8]),
		])
	}

	#[test]
	fn cosine_bounds() {
		assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
		assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
		assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
	}

	#[tokio::test]
	async fn fetch_respects_filter_and_skips_unknown() {
		let s = store();
		let got = s.fetch(&["p1".into(), "c1".into(), "zz".into()], &ChunkFilter::children()).await.unwrap();
		assert_eq!(got.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c1"]);
		let by_page = s.scan(&ChunkFilter::children().with_doc("a").with_page(2)).await.unwrap();
		assert_eq!(by_page.len(), 1);
		assert_eq!(by_page[0].id, "c2");
	}

	#[tokio::test]
	async fn search_orders_by_similarity() {
		let s = store();
		let hits = s.search_vec(&[1.0, 0.0], 2, &ChunkFilter::children()).await.unwrap();
		assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["c1", "c3"]);
	}

	#[tokio::test]
	async fn replace_document_swaps_population() {
		let s = store();
		s.replace_document("a", vec![Chunk::parent("p2", "a", 1, "new parent")]).await.unwrap();
		let a = s.scan(&ChunkFilter::default().with_doc("a")).await.unwrap();
		assert_eq!(a.len(), 1);
		assert_eq!(a[0].id, "p2");
		assert_eq!(s.scan(&ChunkFilter::default().with_doc("b")).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn replace_document_rejects_foreign_chunks() {
		let s = store();
		let err = s.replace_document("a", vec![Chunk::parent("px", "b", 1, "x")]).await;
		assert!(err.is_err());
		assert_eq!(s.len(), 4);
	}
}
