//! docsearch-vector
//!
//! Dense retrieval over child chunks. `DenseIndex` enforces the child-only
//! contract on top of any `VectorSearch` backend; two backends ship here, an
//! in-memory store for tests and small corpora, and a LanceDB table.

pub mod dense;
pub mod lance_store;
pub mod memory;
pub mod reader;
pub mod schema;
pub mod table;
pub mod writer;

pub use dense::DenseIndex;
pub use lance_store::LanceChunkStore;
pub use memory::InMemoryChunkStore;
