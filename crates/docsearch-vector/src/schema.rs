use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID: &str = "id";
pub const KIND: &str = "kind";
pub const PARENT_ID: &str = "parent_id";
pub const DOC_ID: &str = "doc_id";
pub const PAGE: &str = "page";
pub const SECTION_TITLE: &str = "section_title";
pub const X0: &str = "x0";
pub const Y0: &str = "y0";
pub const X1: &str = "x1";
pub const Y1: &str = "y1";
pub const TEXT: &str = "text";
pub const VECTOR: &str = "vector";
/// Column LanceDB appends to vector search results.
pub const DISTANCE: &str = "_distance";

/// One table holds children and parents. Parents carry a null vector and a
/// null `parent_id`.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID, DataType::Utf8, false),
		Field::new(KIND, DataType::Utf8, false),
		Field::new(PARENT_ID, DataType::Utf8, true),
		Field::new(DOC_ID, DataType::Utf8, false),
		Field::new(PAGE, DataType::UInt32, false),
		Field::new(SECTION_TITLE, DataType::Utf8, true),
		Field::new(X0, DataType::Float32, true),
		Field::new(Y0, DataType::Float32, true),
		Field::new(X1, DataType::Float32, true),
		Field::new(Y1, DataType::Float32, true),
		Field::new(TEXT, DataType::Utf8, false),
		Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Quote a string literal for a LanceDB SQL predicate.
pub fn sql_literal(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }

/// `id IN (...)` predicate over `ids`.
pub fn id_in(ids: &[String]) -> String {
	let list = ids.iter().map(|id| sql_literal(id)).collect::<Vec<_>>().join(",");
	format!("{ID} IN ({list})")
}
