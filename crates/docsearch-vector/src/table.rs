//! LanceDB connection and chunk-table bootstrap.

use anyhow::Result;
use arrow_array::RecordBatchIterator;
use arrow_schema::{DataType, SchemaRef};
use lancedb::{connect, Connection, Table};
use tracing::info;

use docsearch_core::error::Error;

use crate::schema::{build_chunk_schema, VECTOR};

pub async fn open_db(uri: &str) -> Result<Connection> {
	Ok(connect(uri).execute().await?)
}

/// Open the chunk table `name`, creating it empty on first use. An existing
/// table must store vectors of exactly `dim` components.
pub async fn open_chunk_table(db: &Connection, name: &str, dim: i32) -> Result<Table> {
	if db.table_names().execute().await?.iter().any(|n| n == name) {
		let table = db.open_table(name).execute().await?;
		check_vector_dim(&table.schema().await?, dim)?;
		return Ok(table);
	}
	let schema = build_chunk_schema(dim);
	let empty = RecordBatchIterator::new(Vec::new().into_iter(), schema.clone());
	let table = db.create_table(name, Box::new(empty)).execute().await?;
	info!(table = name, dim, "created chunk table");
	Ok(table)
}

fn check_vector_dim(schema: &SchemaRef, dim: i32) -> Result<()> {
	let field = schema.field_with_name(VECTOR)?;
	match field.data_type() {
		DataType::FixedSizeList(_, stored) if *stored == dim => Ok(()),
		DataType::FixedSizeList(_, stored) => {
			Err(Error::DimensionMismatch { expected: dim as usize, actual: *stored as usize }.into())
		}
		other => anyhow::bail!("column '{VECTOR}' has unexpected type {other}"),
	}
}
