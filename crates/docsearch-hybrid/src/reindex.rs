//! Out-of-band index maintenance. Every operation here takes the reindex
//! lock without waiting; a concurrent request gets `ReindexStatus::Busy`.
//! Queries keep using the previous lexical index until the new one is
//! installed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

use docsearch_core::chunk_files::DocumentChunks;
use docsearch_core::error::{Error, Result, Stage};
use docsearch_core::types::{Chunk, ChunkFilter};
use docsearch_text::LexicalIndex;

use crate::orchestrator::{elapsed_ms, QueryContext};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReindexStatus {
    Completed { documents: usize, chunks: usize, lexical_children: usize },
    Busy,
}

impl QueryContext {
    /// Rebuild the lexical index from the children currently in the store.
    pub async fn rebuild_lexical(&self) -> Result<ReindexStatus> {
        let Ok(_guard) = self.reindex_lock.try_lock() else {
            warn!("reindex already in progress");
            return Ok(ReindexStatus::Busy);
        };
        let start = Instant::now();
        let children = self.stored_children(&HashSet::new()).await?;
        let index = self.build_lexical(children).await?;
        let lexical_children = index.len();
        self.lexical.install(index);
        info!(children = lexical_children, elapsed_ms = elapsed_ms(start), "lexical index rebuilt");
        Ok(ReindexStatus::Completed { documents: 0, chunks: 0, lexical_children })
    }

    /// Replace every chunk of `doc_id` with `chunks`, embedding children that
    /// arrive without a vector, then rebuild the lexical index.
    pub async fn reindex_document(&self, doc_id: &str, chunks: Vec<Chunk>) -> Result<ReindexStatus> {
        let doc = DocumentChunks { doc_id: doc_id.to_string(), chunks };
        self.index_documents(vec![doc], |_, _| {}).await
    }

    /// Bulk variant of `reindex_document`. Every document is validated and
    /// embedded and the next lexical index is built before anything is
    /// written; the store replacements and the index install then run back
    /// to back. `on_document` is called after each replacement with the
    /// document id and its chunk count.
    pub async fn index_documents<F>(&self, docs: Vec<DocumentChunks>, mut on_document: F) -> Result<ReindexStatus>
    where
        F: FnMut(&str, usize) + Send,
    {
        let Ok(_guard) = self.reindex_lock.try_lock() else {
            warn!("reindex already in progress");
            return Ok(ReindexStatus::Busy);
        };
        let start = Instant::now();
        let mut docs = last_per_document(docs);
        for doc in &mut docs {
            self.prepare(doc).await?;
        }

        let replaced: HashSet<String> = docs.iter().map(|d| d.doc_id.clone()).collect();
        let mut children = self.stored_children(&replaced).await?;
        children.extend(docs.iter().flat_map(|d| d.chunks.iter().filter(|c| c.is_child()).cloned()));
        let index = self.build_lexical(children).await?;

        let documents = docs.len();
        let mut chunks = 0;
        for doc in docs {
            let n = doc.chunks.len();
            self.store.replace_document(&doc.doc_id, doc.chunks).await.map_err(|e| Error::upstream(Stage::Reindex, e))?;
            debug!(doc_id = %doc.doc_id, chunks = n, "document replaced");
            on_document(&doc.doc_id, n);
            chunks += n;
        }
        let lexical_children = index.len();
        self.lexical.install(index);
        info!(documents, chunks, lexical_children, elapsed_ms = elapsed_ms(start), "documents reindexed");
        Ok(ReindexStatus::Completed { documents, chunks, lexical_children })
    }

    /// Validate one document and embed its children that lack a vector.
    async fn prepare(&self, doc: &mut DocumentChunks) -> Result<()> {
        doc.validate()?;
        self.embed_missing(&mut doc.chunks).await
    }

    async fn embed_missing(&self, chunks: &mut [Chunk]) -> Result<()> {
        let dim = self.dense.dim();
        if let Some(bad) = chunks.iter().filter_map(|c| c.embedding.as_ref()).find(|e| e.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
        }
        let pending: Vec<usize> = chunks.iter().enumerate().filter(|(_, c)| c.is_child() && c.embedding.is_none()).map(|(i, _)| i).collect();
        if pending.is_empty() {
            return Ok(());
        }
        let embedder = self.embedder.get().await.map_err(|e| Error::upstream(Stage::Embedding, e))?;
        let texts: Vec<String> = pending.iter().map(|&i| chunks[i].text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await.map_err(|e| Error::upstream(Stage::Embedding, e))?;
        if vectors.len() != texts.len() {
            return Err(Error::upstream(Stage::Embedding, format!("{} vectors for {} texts", vectors.len(), texts.len())));
        }
        for (i, v) in pending.into_iter().zip(vectors) {
            if v.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: v.len() });
            }
            chunks[i].embedding = Some(v);
        }
        debug!(embedded = texts.len(), "embedded children");
        Ok(())
    }

    /// Stored children, minus those of the `excluded` documents.
    async fn stored_children(&self, excluded: &HashSet<String>) -> Result<Vec<Chunk>> {
        let mut children = self.store.scan(&ChunkFilter::children()).await.map_err(|e| Error::upstream(Stage::Reindex, e))?;
        children.retain(|c| !excluded.contains(&c.doc_id));
        Ok(children)
    }

    /// Build (and persist, when a directory is configured) on the blocking
    /// pool. Nothing is installed here.
    async fn build_lexical(&self, children: Vec<Chunk>) -> Result<LexicalIndex> {
        let dir = self.lexical_dir.clone();
        tokio::task::spawn_blocking(move || match dir {
            Some(dir) => LexicalIndex::build_in(&dir, &children),
            None => LexicalIndex::build(&children),
        })
        .await
        .map_err(|e| Error::upstream(Stage::Reindex, e))?
    }
}

/// A document listed twice is replaced once, by its last listing.
fn last_per_document(docs: Vec<DocumentChunks>) -> Vec<DocumentChunks> {
    let mut seen = HashSet::new();
    let mut kept: Vec<DocumentChunks> = docs.into_iter().rev().filter(|d| seen.insert(d.doc_id.clone())).collect();
    kept.reverse();
    kept
}
