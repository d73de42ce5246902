//! docsearch-embed
//!
//! candle-backed models behind the `Embedder` and `Reranker` seams, plus
//! deterministic doubles for running without weights.

pub mod cross_encoder;
pub mod device;
pub mod embedder;
pub mod error;
pub mod fake;
pub mod pool;
pub mod tokenize;
pub mod weights;

use std::sync::Arc;
use tracing::{info, warn};

use docsearch_core::config::ModelSettings;
use docsearch_core::traits::{Embedder, Reranker};

pub use cross_encoder::CrossEncoderReranker;
pub use embedder::XlmRobertaEmbedder;
pub use error::ModelError;
pub use fake::{HashEmbedder, TermOverlapReranker};
pub use pool::masked_mean_l2;

/// Embedder selected by `models`: the hash embedder when `use_fake` is set,
/// otherwise the XLM-RoBERTa model under `embedding_dir`.
pub fn load_embedder(models: &ModelSettings) -> anyhow::Result<Arc<dyn Embedder>> {
    if models.use_fake {
        info!(dim = models.embedding_dim, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(models.embedding_dim)));
    }
    let embedder = XlmRobertaEmbedder::load(&models.embedding_dir(), models.max_len)?;
    if embedder.dim() != models.embedding_dim {
        warn!(configured = models.embedding_dim, model = embedder.dim(), "embedding_dim differs from model hidden size");
        return Err(docsearch_core::Error::DimensionMismatch { expected: models.embedding_dim, actual: embedder.dim() }.into());
    }
    Ok(Arc::new(embedder))
}

pub fn load_reranker(models: &ModelSettings) -> anyhow::Result<Arc<dyn Reranker>> {
    if models.use_fake {
        info!("using term-overlap reranker");
        return Ok(Arc::new(TermOverlapReranker));
    }
    Ok(Arc::new(CrossEncoderReranker::load(&models.reranker_dir(), models.max_len)?))
}
