use serde::{Deserialize, Serialize};

/// Identity of the child behind one lexical ordinal. The entry at position
/// `i` describes document ordinal `i` of the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SidecarEntry {
	pub doc_id: String,
	pub page: u32,
	pub chunk_id: String,
}

/// blake3 over the canonical JSON encoding of the entries.
pub fn digest(entries: &[SidecarEntry]) -> Result<String, serde_json::Error> {
	let bytes = serde_json::to_vec(entries)?;
	Ok(blake3::hash(&bytes).to_hex().to_string())
}
