//! docsearch-text
//!
//! BM25 lexical index over child chunks, built on tantivy. Each build is one
//! segment whose document ordinals line up with a sidecar of chunk
//! identities; the live handle is swapped on rebuild.

pub mod handle;
pub mod index;
pub mod sidecar;
pub mod tantivy_utils;

pub use handle::{LexicalIndexHandle, LexicalStatus};
pub use index::LexicalIndex;
pub use sidecar::SidecarEntry;
