use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use docsearch_core::error::{Error, Stage};
use docsearch_core::query::{Degradation, DegradationKind};
use docsearch_core::traits::ChunkStore;
use docsearch_core::types::{Chunk, ChunkFilter, ChunkId};

/// Context assembled for a set of citations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedContext {
    /// Distinct parents, in the order their first child was cited.
    pub parents: Vec<Chunk>,
    /// Cited children whose parent could not be resolved.
    pub orphans: Vec<Chunk>,
    /// Parents and orphans interleaved in citation order.
    pub context: Vec<Chunk>,
    pub degradation: Option<Degradation>,
}

/// Distinct parent ids of `citations`, first-seen order.
pub fn parent_ids(citations: &[Chunk]) -> Vec<ChunkId> {
    let mut seen = HashSet::new();
    citations
        .iter()
        .filter_map(|c| c.parent_id.as_ref())
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}

/// Resolve cited children to their parents with one store call.
///
/// Anything the store returns that is not a parent is ignored. A failed or
/// slow fetch turns every citation into an orphan.
pub async fn resolve_parents(store: &dyn ChunkStore, citations: &[Chunk], timeout: Duration) -> ResolvedContext {
    if citations.is_empty() {
        return ResolvedContext::default();
    }
    let ids = parent_ids(citations);
    let start = Instant::now();
    let fetched = match tokio::time::timeout(timeout, store.fetch(&ids, &ChunkFilter::parents())).await {
        Ok(Ok(chunks)) => Ok(chunks),
        Ok(Err(e)) => Err((DegradationKind::Failed, Error::upstream(Stage::ParentFetch, e))),
        Err(_) => Err((DegradationKind::TimedOut, Error::Timeout { stage: Stage::ParentFetch, elapsed: start.elapsed() })),
    };
    let (found, degradation) = match fetched {
        Ok(chunks) => (chunks, None),
        Err((kind, err)) => {
            error!(stage = %Stage::ParentFetch, error = %err, "parent fetch failed, using citations as context");
            (Vec::new(), Some(Degradation { stage: Stage::ParentFetch, kind, message: err.to_string() }))
        }
    };
    let mut by_id: HashMap<ChunkId, Chunk> = found.into_iter().filter(Chunk::is_parent).map(|c| (c.id.clone(), c)).collect();

    let mut resolved = ResolvedContext { degradation, ..ResolvedContext::default() };
    for child in citations {
        let parent_id = child.parent_id.as_ref();
        if let Some(parent) = parent_id.and_then(|p| by_id.remove(p)) {
            resolved.context.push(parent.clone());
            resolved.parents.push(parent);
            continue;
        }
        if resolved.parents.iter().any(|p| Some(&p.id) == parent_id) {
            continue;
        }
        if resolved.degradation.is_none() {
            warn!(chunk_id = %child.id, parent_id = ?parent_id, "orphan citation, using its own text as context");
        }
        resolved.context.push(child.clone());
        resolved.orphans.push(child.clone());
    }
    debug!(parents = resolved.parents.len(), orphans = resolved.orphans.len(), "resolved parents");
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docsearch_vector::InMemoryChunkStore;

    fn child(id: &str, parent: &str) -> Chunk { Chunk::child(id, parent, "d", 1, id) }

    struct Unreachable;

    #[async_trait]
    impl ChunkStore for Unreachable {
        async fn fetch(&self, _ids: &[ChunkId], _f: &ChunkFilter) -> anyhow::Result<Vec<Chunk>> { anyhow::bail!("store down") }
        async fn scan(&self, _f: &ChunkFilter) -> anyhow::Result<Vec<Chunk>> { anyhow::bail!("store down") }
        async fn replace_document(&self, _d: &str, _c: Vec<Chunk>) -> anyhow::Result<()> { anyhow::bail!("store down") }
    }

    fn store() -> InMemoryChunkStore {
        InMemoryChunkStore::new(vec![
            Chunk::parent("p1", "d", 1, "parent one"),
            Chunk::parent("p2", "d", 2, "parent two"),
            Chunk::parent("p3", "d", 3, "parent three"),
            child("c2", "p1"),
        ])
    }

    #[tokio::test]
    async fn distinct_parents_in_citation_order() {
        let reranked = [child("c5", "p1"), child("c2", "p1"), child("c9", "p2"), child("c1", "p3"), child("c7", "p2")];
        let citations = &reranked[..3];
        let out = resolve_parents(&store(), citations, Duration::from_secs(1)).await;
        assert_eq!(out.parents.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["p1", "p2"]);
        assert!(out.orphans.is_empty());
        assert!(out.parents.iter().all(Chunk::is_parent));
        assert_eq!(out.context, out.parents);
    }

    #[tokio::test]
    async fn missing_parent_makes_orphan() {
        let citations = [child("c1", "p1"), child("c8", "p404")];
        let out = resolve_parents(&store(), &citations, Duration::from_secs(1)).await;
        assert_eq!(out.parents.len(), 1);
        assert_eq!(out.orphans.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c8"]);
        assert_eq!(out.context.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["p1", "c8"]);
        assert!(out.degradation.is_none());
    }

    #[tokio::test]
    async fn parent_id_pointing_at_child_is_orphan() {
        let citations = [child("c9", "c2")];
        let out = resolve_parents(&store(), &citations, Duration::from_secs(1)).await;
        assert!(out.parents.is_empty());
        assert_eq!(out.orphans.len(), 1);
    }

    #[tokio::test]
    async fn store_failure_orphans_everything() {
        let citations = [child("c1", "p1"), child("c2", "p2")];
        let out = resolve_parents(&Unreachable, &citations, Duration::from_secs(1)).await;
        assert!(out.parents.is_empty());
        assert_eq!(out.orphans.len(), 2);
        let d = out.degradation.unwrap();
        assert_eq!((d.stage, d.kind), (Stage::ParentFetch, DegradationKind::Failed));
    }

    #[test]
    fn parent_ids_are_deduplicated() {
        let ids = parent_ids(&[child("a", "p2"), child("b", "p1"), child("c", "p2")]);
        assert_eq!(ids, vec!["p2", "p1"]);
    }
}
