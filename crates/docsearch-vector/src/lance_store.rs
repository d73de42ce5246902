use anyhow::{ensure, Result};
use arrow_array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use tracing::{debug, info};

use docsearch_core::traits::{ChunkStore, VectorSearch};
use docsearch_core::types::{Chunk, ChunkFilter, ChunkId, VectorHit};

use crate::reader::{batch_to_chunks, batch_to_hits};
use crate::schema::{id_in, sql_literal, DOC_ID, ID, KIND, PAGE, VECTOR};
use crate::table::{open_chunk_table, open_db};
use crate::writer::chunks_to_record_batch;

/// Chunk store and vector search backed by one LanceDB table.
pub struct LanceChunkStore {
	db: Connection,
	table_name: String,
	dim: i32,
}

impl LanceChunkStore {
	/// Connect to `uri` and create the chunk table if it does not exist yet.
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let dim = i32::try_from(dim)?;
		let db = open_db(uri).await?;
		open_chunk_table(&db, table_name, dim).await?;
		debug!(uri, table = table_name, dim, "opened lance chunk store");
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	async fn table(&self) -> Result<Table> { Ok(self.db.open_table(&self.table_name).execute().await?) }

	pub async fn count(&self, filter: &ChunkFilter) -> Result<usize> {
		Ok(self.table().await?.count_rows(filter_sql(filter)).await?)
	}

	async fn collect(&self, predicate: Option<String>) -> Result<Vec<Chunk>> {
		let t = self.table().await?;
		let total = t.count_rows(predicate.clone()).await?;
		if total == 0 { return Ok(Vec::new()); }
		let mut query = t.query().limit(total);
		if let Some(p) = predicate { query = query.only_if(p); }
		let mut stream = query.execute().await?;
		let mut out = Vec::with_capacity(total);
		while let Some(batch) = stream.try_next().await? {
			out.extend(batch_to_chunks(&batch)?);
		}
		// Row order is not guaranteed after merge_insert.
		out.sort_by(|a, b| (a.doc_id.as_str(), a.page, a.id.as_str()).cmp(&(b.doc_id.as_str(), b.page, b.id.as_str())));
		Ok(out)
	}
}

/// SQL predicate for `filter`, `None` when it matches everything.
pub fn filter_sql(filter: &ChunkFilter) -> Option<String> {
	let mut parts = Vec::new();
	if let Some(kind) = filter.kind { parts.push(format!("{KIND} = {}", sql_literal(kind.as_str()))); }
	if let Some(doc) = &filter.doc_id { parts.push(format!("{DOC_ID} = {}", sql_literal(doc))); }
	if let Some(page) = filter.page { parts.push(format!("{PAGE} = {page}")); }
	(!parts.is_empty()).then(|| parts.join(" AND "))
}

fn and(a: String, b: Option<String>) -> String {
	match b {
		Some(b) => format!("({a}) AND ({b})"),
		None => a,
	}
}

#[async_trait]
impl ChunkStore for LanceChunkStore {
	async fn fetch(&self, ids: &[ChunkId], filter: &ChunkFilter) -> Result<Vec<Chunk>> {
		if ids.is_empty() { return Ok(Vec::new()); }
		self.collect(Some(and(id_in(ids), filter_sql(filter)))).await
	}

	async fn scan(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>> { self.collect(filter_sql(filter)).await }

	/// One commit: matched ids are updated, new ids inserted, and rows of
	/// `doc_id` absent from `chunks` deleted.
	async fn replace_document(&self, doc_id: &str, chunks: Vec<Chunk>) -> Result<()> {
		for c in &chunks {
			ensure!(c.doc_id == doc_id, "chunk '{}' belongs to '{}', not '{doc_id}'", c.id, c.doc_id);
		}
		let t = self.table().await?;
		let doc_predicate = format!("{DOC_ID} = {}", sql_literal(doc_id));
		if chunks.is_empty() {
			t.delete(&doc_predicate).await?;
			info!(doc_id, "removed document from lance store");
			return Ok(());
		}
		let batch = chunks_to_record_batch(&chunks, self.dim)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		let mut mi = t.merge_insert(&[ID]);
		mi.when_matched_update_all(None).when_not_matched_insert_all().when_not_matched_by_source_delete(Some(doc_predicate));
		mi.execute(reader).await?;
		info!(doc_id, chunks = chunks.len(), "replaced document in lance store");
		Ok(())
	}
}

#[async_trait]
impl VectorSearch for LanceChunkStore {
	async fn search_vec(&self, query: &[f32], k: usize, filter: &ChunkFilter) -> Result<Vec<VectorHit>> {
		if k == 0 { return Ok(Vec::new()); }
		let t = self.table().await?;
		let mut q = t
			.vector_search(query.to_vec())?
			.column(VECTOR)
			.distance_type(DistanceType::Cosine)
			.select(Select::columns(&[ID, KIND]))
			.limit(k);
		if let Some(p) = filter_sql(filter) { q = q.only_if(p); }
		let mut stream = q.execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			hits.extend(batch_to_hits(&batch)?);
		}
		Ok(hits)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filter_sql_combines_fields() {
		assert_eq!(filter_sql(&ChunkFilter::default()), None);
		assert_eq!(
			filter_sql(&ChunkFilter::children().with_doc("code").with_page(4)).as_deref(),
			Some("kind = 'child' AND doc_id = 'code' AND page = 4")
		);
		assert_eq!(and("a".into(), None), "a");
		assert_eq!(and("a".into(), Some("b".into())), "(a) AND (b)");
	}
}
