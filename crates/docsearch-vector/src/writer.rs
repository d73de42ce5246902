use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Float32Array, RecordBatch, StringArray, UInt32Array};
use std::sync::Arc;

use docsearch_core::error::Error;
use docsearch_core::types::Chunk;

use crate::schema::build_chunk_schema;

/// Columnar encoding of `chunks`. Every child must carry an embedding of
/// length `dim`; parents are stored with a null vector.
pub fn chunks_to_record_batch(chunks: &[Chunk], dim: i32) -> Result<RecordBatch> {
	let schema = build_chunk_schema(dim);
	let mut ids = Vec::with_capacity(chunks.len());
	let mut kinds = Vec::with_capacity(chunks.len());
	let mut parent_ids: Vec<Option<String>> = Vec::with_capacity(chunks.len());
	let mut doc_ids = Vec::with_capacity(chunks.len());
	let mut pages = Vec::with_capacity(chunks.len());
	let mut titles: Vec<Option<String>> = Vec::with_capacity(chunks.len());
	let (mut x0, mut y0, mut x1, mut y1): (Vec<Option<f32>>, Vec<Option<f32>>, Vec<Option<f32>>, Vec<Option<f32>>) = Default::default();
	let mut texts = Vec::with_capacity(chunks.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
	for c in chunks {
		c.validate()?;
		let vector = match (&c.embedding, c.is_child()) {
			(Some(v), true) if v.len() == dim as usize => Some(v.iter().map(|&x| Some(x)).collect()),
			(Some(v), true) => return Err(Error::DimensionMismatch { expected: dim as usize, actual: v.len() }.into()),
			(None, true) => return Err(anyhow!("child '{}' has no embedding", c.id)),
			(_, false) => None,
		};
		ids.push(c.id.clone());
		kinds.push(c.kind.as_str());
		parent_ids.push(c.parent_id.clone());
		doc_ids.push(c.doc_id.clone());
		pages.push(c.page);
		titles.push(c.section_title.clone());
		x0.push(c.coordinates.map(|b| b.x0));
		y0.push(c.coordinates.map(|b| b.y0));
		x1.push(c.coordinates.map(|b| b.x1));
		y1.push(c.coordinates.map(|b| b.y1));
		texts.push(c.text.clone());
		vectors.push(vector);
	}
	let record_batch = RecordBatch::try_new(schema, vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(kinds)),
		Arc::new(StringArray::from(parent_ids)),
		Arc::new(StringArray::from(doc_ids)),
		Arc::new(UInt32Array::from(pages)),
		Arc::new(StringArray::from(titles)),
		Arc::new(Float32Array::from(x0)),
		Arc::new(Float32Array::from(y0)),
		Arc::new(Float32Array::from(x1)),
		Arc::new(Float32Array::from(y1)),
		Arc::new(StringArray::from(texts)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
	])?;
	Ok(record_batch)
}
