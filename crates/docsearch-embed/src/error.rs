use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model directory not found: {0}")]
    MissingModelDir(PathBuf),

    #[error("Missing model file {0}")]
    MissingFile(PathBuf),

    #[error("Tokenization failed: {0}")]
    Tokenizer(String),

    #[error("Unexpected tensor shape: {0}")]
    Shape(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
