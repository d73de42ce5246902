//! docsearch-core
//!
//! Chunk data model, query request/response types, collaborator traits,
//! typed errors and configuration shared by every docsearch crate.

pub mod chunk_files;
pub mod config;
pub mod error;
pub mod query;
pub mod traits;
pub mod types;

pub use error::{Error, Result, Stage};
