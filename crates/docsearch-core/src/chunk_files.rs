//! Reader for the chunk files handed over by the ingestion pipeline.
//!
//! One file per source document, named `<anything>.chunks.json`:
//!
//! ```json
//! { "doc_id": "code-du-travail", "chunks": [ { "id": "...", "kind": "child", ... } ] }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Chunk;

pub const CHUNK_FILE_SUFFIX: &str = ".chunks.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunks {
    pub doc_id: String,
    pub chunks: Vec<Chunk>,
}

impl DocumentChunks {
    /// Validate every chunk and check they all belong to `doc_id`.
    pub fn validate(&self) -> Result<()> {
        for c in &self.chunks {
            c.validate()?;
            if c.doc_id != self.doc_id {
                return Err(Error::InvalidChunk { id: c.id.clone(), reason: format!("belongs to '{}', not '{}'", c.doc_id, self.doc_id) });
            }
        }
        Ok(())
    }
}

pub fn load_file(path: &Path) -> Result<DocumentChunks> {
    let raw = fs::read_to_string(path)?;
    let doc: DocumentChunks = serde_json::from_str(&raw)?;
    doc.validate()?;
    debug!(path = %path.display(), doc_id = %doc.doc_id, chunks = doc.chunks.len(), "loaded chunk file");
    Ok(doc)
}

/// Load every chunk file under `root`, sorted by path so the resulting
/// corpus order is stable between runs.
pub fn load_dir(root: &Path) -> Result<Vec<DocumentChunks>> {
    let files = list_chunk_files(root);
    if files.is_empty() {
        warn!(root = %root.display(), "no chunk files found");
        return Ok(vec![]);
    }
    let mut docs = Vec::with_capacity(files.len());
    for (i, path) in files.iter().enumerate() {
        debug!("Processing file {}/{}: {}", i + 1, files.len(), path.display());
        docs.push(load_file(path)?);
    }
    let total: usize = docs.iter().map(|d| d.chunks.len()).sum();
    info!(files = files.len(), chunks = total, "loaded chunk files");
    Ok(docs)
}

fn list_chunk_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|n| n.ends_with(CHUNK_FILE_SUFFIX)))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_doc(dir: &Path, name: &str, doc: &DocumentChunks) {
        fs::write(dir.join(name), serde_json::to_string(doc).unwrap()).unwrap();
    }

    fn sample(doc_id: &str) -> DocumentChunks {
        DocumentChunks {
            doc_id: doc_id.to_string(),
            chunks: vec![
                Chunk::parent(format!("{doc_id}-p1"), doc_id, 1, "Section one"),
                Chunk::child(format!("{doc_id}-c1"), format!("{doc_id}-p1"), doc_id, 1, "first paragraph"),
            ],
        }
    }

    #[test]
    fn loads_only_chunk_files_in_path_order() {
        let tmp = TempDir::new().unwrap();
        write_doc(tmp.path(), "b.chunks.json", &sample("b"));
        write_doc(tmp.path(), "a.chunks.json", &sample("a"));
        fs::write(tmp.path().join("notes.json"), "{}").unwrap();

        let docs = load_dir(tmp.path()).expect("load");
        let ids: Vec<&str> = docs.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(docs[0].chunks.iter().filter(|c| c.is_child()).count(), 1);
    }

    #[test]
    fn rejects_child_without_parent() {
        let tmp = TempDir::new().unwrap();
        let mut doc = sample("a");
        doc.chunks[1].parent_id = None;
        write_doc(tmp.path(), "a.chunks.json", &doc);
        assert!(matches!(load_dir(tmp.path()), Err(Error::InvalidChunk { .. })));
    }

    #[test]
    fn rejects_foreign_chunk() {
        let mut doc = sample("a");
        doc.chunks[1].doc_id = "other".into();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn empty_dir_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load_dir(tmp.path()).unwrap().is_empty());
    }
}
