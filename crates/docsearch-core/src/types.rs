//! Domain types shared by the lexical, dense and hybrid engines.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub type ChunkId = String;

/// Granularity of a chunk.
///
/// Children are the atomic, citation-grade units that get indexed and ranked.
/// Parents aggregate the children of one section and are only ever handed out
/// as generation context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Child,
    Parent,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Child => "child",
            ChunkKind::Parent => "parent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "child" => Some(ChunkKind::Child),
            "parent" => Some(ChunkKind::Parent),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spatial box of a chunk on its page, in page coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// A retrievable fragment of a source document.
///
/// - `id`: stable across rebuilds of the same source document
/// - `kind`/`parent_id`: every child points at exactly one parent, parents point nowhere
/// - `doc_id`/`page`/`coordinates`/`section_title`: provenance, immutable after ingestion
/// - `text`: what gets tokenized, embedded and reranked
/// - `embedding`: L2-normalized vector, only on children served by the dense index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub kind: ChunkKind,
    #[serde(default)]
    pub parent_id: Option<ChunkId>,
    pub doc_id: String,
    pub page: u32,
    #[serde(default)]
    pub coordinates: Option<BoundingBox>,
    #[serde(default)]
    pub section_title: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn child(
        id: impl Into<ChunkId>,
        parent_id: impl Into<ChunkId>,
        doc_id: impl Into<String>,
        page: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ChunkKind::Child,
            parent_id: Some(parent_id.into()),
            doc_id: doc_id.into(),
            page,
            coordinates: None,
            section_title: None,
            text: text.into(),
            embedding: None,
        }
    }

    pub fn parent(id: impl Into<ChunkId>, doc_id: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ChunkKind::Parent,
            parent_id: None,
            doc_id: doc_id.into(),
            page,
            coordinates: None,
            section_title: None,
            text: text.into(),
            embedding: None,
        }
    }

    pub fn with_section_title(mut self, title: impl Into<String>) -> Self {
        self.section_title = Some(title.into());
        self
    }

    pub fn with_coordinates(mut self, bbox: BoundingBox) -> Self {
        self.coordinates = Some(bbox);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn is_child(&self) -> bool {
        self.kind == ChunkKind::Child
    }

    pub fn is_parent(&self) -> bool {
        self.kind == ChunkKind::Parent
    }

    /// Check the child/parent invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidChunk { id: self.id.clone(), reason: "empty id".into() });
        }
        match (self.kind, self.parent_id.as_deref()) {
            (ChunkKind::Child, None) => Err(Error::InvalidChunk { id: self.id.clone(), reason: "child without parent_id".into() }),
            (ChunkKind::Child, Some("")) => Err(Error::InvalidChunk { id: self.id.clone(), reason: "child with empty parent_id".into() }),
            (ChunkKind::Parent, Some(_)) => Err(Error::InvalidChunk { id: self.id.clone(), reason: "parent with parent_id".into() }),
            (ChunkKind::Parent, None) if self.embedding.is_some() => {
                Err(Error::InvalidChunk { id: self.id.clone(), reason: "parent carries an embedding".into() })
            }
            _ => Ok(()),
        }
    }

    pub fn to_ref(&self) -> ChunkRef {
        ChunkRef {
            chunk_id: self.id.clone(),
            doc_id: self.doc_id.clone(),
            page: self.page,
            text: self.text.clone(),
            section_title: self.section_title.clone(),
        }
    }
}

/// Restricts store lookups and vector searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    pub kind: Option<ChunkKind>,
    pub doc_id: Option<String>,
    pub page: Option<u32>,
}

impl ChunkFilter {
    pub fn children() -> Self {
        Self { kind: Some(ChunkKind::Child), ..Self::default() }
    }

    pub fn parents() -> Self {
        Self { kind: Some(ChunkKind::Parent), ..Self::default() }
    }

    pub fn with_doc(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.kind.map_or(true, |k| k == chunk.kind)
            && self.doc_id.as_deref().map_or(true, |d| d == chunk.doc_id)
            && self.page.map_or(true, |p| p == chunk.page)
    }
}

/// Which stage produced a score. Scores are only comparable within one stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStage {
    Lexical,
    Dense,
    Fused,
    Rerank,
}

/// `(chunk_id, score)` as produced by one stage. Higher is better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedCandidate {
    pub id: ChunkId,
    pub score: f32,
    pub stage: ScoreStage,
}

impl RankedCandidate {
    pub fn new(id: impl Into<ChunkId>, score: f32, stage: ScoreStage) -> Self {
        Self { id: id.into(), score, stage }
    }
}

/// The minimal surface returned by a vector backend. `kind` lets the dense
/// index drop anything that is not a child even if the backend ignored the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: ChunkId,
    pub kind: ChunkKind,
    pub score: f32,
}

/// Public projection of a chunk in query responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRef {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub page: u32,
    pub text: String,
    pub section_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_requires_parent() {
        let mut c = Chunk::child("c1", "p1", "doc", 1, "text");
        assert!(c.validate().is_ok());
        c.parent_id = None;
        assert!(matches!(c.validate(), Err(Error::InvalidChunk { .. })));
    }

    #[test]
    fn parent_rejects_parent_id_and_embedding() {
        let mut p = Chunk::parent("p1", "doc", 1, "section");
        assert!(p.validate().is_ok());
        p.parent_id = Some("p0".into());
        assert!(p.validate().is_err());
        let p = Chunk::parent("p1", "doc", 1, "section").with_embedding(vec![1.0]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let c = Chunk::child("c1", "p1", "doc-a", 3, "text");
        assert!(ChunkFilter::children().matches(&c));
        assert!(!ChunkFilter::parents().matches(&c));
        assert!(ChunkFilter::children().with_doc("doc-a").with_page(3).matches(&c));
        assert!(!ChunkFilter::default().with_page(4).matches(&c));
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&ChunkKind::Parent).unwrap();
        assert_eq!(json, "\"parent\"");
        assert_eq!(ChunkKind::parse("child"), Some(ChunkKind::Child));
    }
}
