use std::sync::Arc;

use docsearch_core::traits::{ChunkStore, VectorSearch};
use docsearch_core::types::{Chunk, ChunkFilter, ChunkKind};
use docsearch_vector::{DenseIndex, LanceChunkStore};

fn unit(x: f32, y: f32) -> Vec<f32> {
    let n = (x * x + y * y).sqrt();
    vec![x / n, y / n, 0.0, 0.0]
}

fn document(doc_id: &str, prefix: &str) -> Vec<Chunk> {
    vec![
        Chunk::parent(format!("{prefix}p1"), doc_id, 1, "Wages section").with_section_title("Wages"),
        Chunk::child(format!("{prefix}c1"), format!("{prefix}p1"), doc_id, 1, "minimum wage").with_embedding(unit(1.0, 0.0)),
        Chunk::child(format!("{prefix}c2"), format!("{prefix}p1"), doc_id, 1, "overtime").with_embedding(unit(0.0, 1.0)),
    ]
}

#[tokio::test]
async fn stores_and_searches_children() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceChunkStore::open(&tmp.path().to_string_lossy(), "chunks", 4).await?;
    store.replace_document("code", document("code", "")).await?;

    assert_eq!(store.count(&ChunkFilter::default()).await?, 3);
    let parents = store.fetch(&["p1".into(), "c1".into()], &ChunkFilter::parents()).await?;
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].section_title.as_deref(), Some("Wages"));

    let hits = store.search_vec(&unit(1.0, 0.1), 10, &ChunkFilter::children()).await?;
    assert_eq!(hits[0].id, "c1");
    assert!(hits.iter().all(|h| h.kind == ChunkKind::Child));
    Ok(())
}

#[tokio::test]
async fn replace_document_leaves_other_documents_alone() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceChunkStore::open(&tmp.path().to_string_lossy(), "chunks", 4).await?;
    store.replace_document("a", document("a", "a-")).await?;
    store.replace_document("b", document("b", "b-")).await?;

    let mut revised = document("a", "a-");
    revised.truncate(2);
    store.replace_document("a", revised).await?;

    let a: Vec<String> = store.scan(&ChunkFilter::default().with_doc("a")).await?.into_iter().map(|c| c.id).collect();
    assert_eq!(a, vec!["a-c1", "a-p1"]);
    assert_eq!(store.count(&ChunkFilter::default().with_doc("b")).await?, 3);

    store.replace_document("b", Vec::new()).await?;
    assert_eq!(store.count(&ChunkFilter::default().with_doc("b")).await?, 0);
    Ok(())
}

#[tokio::test]
async fn dense_index_over_lance_returns_only_children() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceChunkStore::open(&tmp.path().to_string_lossy(), "chunks", 4).await?;
    store.replace_document("code", document("code", "")).await?;
    let dense = DenseIndex::new(Arc::new(store), 4);
    let hits = dense.search(&unit(0.0, 1.0), 5).await?;
    assert_eq!(hits.first().map(|h| h.id.as_str()), Some("c2"));
    assert!(hits.iter().all(|h| h.id.starts_with('c')));
    Ok(())
}
