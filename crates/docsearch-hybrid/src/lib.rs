//! docsearch-hybrid
//!
//! Hybrid retrieval engine: lexical and dense candidates fused with RRF,
//! reranked by a cross-encoder, and resolved to their parent sections.

pub mod eval;
pub mod fusion;
pub mod models;
pub mod orchestrator;
pub mod reindex;
pub mod rerank;
pub mod resolver;

pub use eval::{evaluate, EvalReport};
pub use fusion::{rrf, FusedCandidate, DEFAULT_RRF_K};
pub use models::LazyModel;
pub use orchestrator::{QueryContext, Readiness, Retrieval};
pub use reindex::ReindexStatus;
pub use resolver::ResolvedContext;
