use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suspension points of the query path and the reindex job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lexical,
    Embedding,
    Dense,
    ChunkFetch,
    Rerank,
    ParentFetch,
    Reindex,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Lexical => "lexical",
            Stage::Embedding => "embedding",
            Stage::Dense => "dense",
            Stage::ChunkFetch => "chunk_fetch",
            Stage::Rerank => "rerank",
            Stage::ParentFetch => "parent_fetch",
            Stage::Reindex => "reindex",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Upstream call failed at {stage}: {message}")]
    Upstream { stage: Stage, message: String },

    #[error("Timed out at {stage} after {elapsed:?}")]
    Timeout { stage: Stage, elapsed: Duration },

    #[error("Malformed persisted index: {0}")]
    MalformedIndex(String),

    #[error("Invalid chunk '{id}': {reason}")]
    InvalidChunk { id: String, reason: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn upstream(stage: Stage, err: impl fmt::Display) -> Self {
        Error::Upstream { stage, message: err.to_string() }
    }

    /// The stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Upstream { stage, .. } | Error::Timeout { stage, .. } => Some(*stage),
            Error::IndexUnavailable(_) | Error::MalformedIndex(_) => Some(Stage::Lexical),
            Error::DimensionMismatch { .. } => Some(Stage::Dense),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
