use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, StringArray, UInt32Array};

use docsearch_core::types::{BoundingBox, Chunk, ChunkKind, VectorHit};

use crate::schema::{DISTANCE, DOC_ID, ID, KIND, PAGE, PARENT_ID, SECTION_TITLE, TEXT, VECTOR, X0, X1, Y0, Y1};

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.ok_or_else(|| anyhow!("{name} column missing"))?
		.as_any()
		.downcast_ref::<T>()
		.ok_or_else(|| anyhow!("{name} column has unexpected type"))
}

fn opt_str(col: &StringArray, i: usize) -> Option<String> {
	(!col.is_null(i)).then(|| col.value(i).to_string())
}

fn kind_at(col: &StringArray, i: usize) -> Result<ChunkKind> {
	ChunkKind::parse(col.value(i)).ok_or_else(|| anyhow!("unknown chunk kind '{}'", col.value(i)))
}

/// Decode full chunks, including embeddings when the batch projects them.
pub fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let ids = column::<StringArray>(batch, ID)?;
	let kinds = column::<StringArray>(batch, KIND)?;
	let parents = column::<StringArray>(batch, PARENT_ID)?;
	let doc_ids = column::<StringArray>(batch, DOC_ID)?;
	let pages = column::<UInt32Array>(batch, PAGE)?;
	let titles = column::<StringArray>(batch, SECTION_TITLE)?;
	let texts = column::<StringArray>(batch, TEXT)?;
	let coords = [X0, Y0, X1, Y1].map(|n| column::<Float32Array>(batch, n).ok());
	let vectors = column::<FixedSizeListArray>(batch, VECTOR).ok();

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let coordinates = match coords {
			[Some(x0), Some(y0), Some(x1), Some(y1)] if !x0.is_null(i) => {
				Some(BoundingBox { x0: x0.value(i), y0: y0.value(i), x1: x1.value(i), y1: y1.value(i) })
			}
			_ => None,
		};
		let embedding = vectors
			.filter(|v| !v.is_null(i))
			.map(|v| v.value(i).as_primitive::<arrow_array::types::Float32Type>().values().to_vec());
		out.push(Chunk {
			id: ids.value(i).to_string(),
			kind: kind_at(kinds, i)?,
			parent_id: opt_str(parents, i),
			doc_id: doc_ids.value(i).to_string(),
			page: pages.value(i),
			coordinates,
			section_title: opt_str(titles, i),
			text: texts.value(i).to_string(),
			embedding,
		});
	}
	Ok(out)
}

/// Decode vector search rows as cosine similarity hits (`1 - distance`).
pub fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<VectorHit>> {
	let ids = column::<StringArray>(batch, ID)?;
	let kinds = column::<StringArray>(batch, KIND)?;
	let distances = column::<Float32Array>(batch, DISTANCE)?;
	(0..batch.num_rows())
		.map(|i| Ok(VectorHit { id: ids.value(i).to_string(), kind: kind_at(kinds, i)?, score: 1.0 - distances.value(i) }))
		.collect()
}
