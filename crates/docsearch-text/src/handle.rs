use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use docsearch_core::error::{Error, Result};
use docsearch_core::types::RankedCandidate;

use crate::index::LexicalIndex;

enum LexicalState {
	Unbuilt,
	Ready(Arc<LexicalIndex>),
	Malformed(String),
}

/// Externally visible state of the live lexical index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LexicalStatus {
	Unbuilt,
	Ready { children: usize },
	Malformed { reason: String },
}

/// The live reference to the lexical index used for serving.
///
/// Queries take a snapshot `Arc` and never observe a half-built index; a
/// rebuild constructs a new `LexicalIndex` elsewhere and `install`s it in one
/// swap. A malformed persisted index keeps the handle degraded until then.
pub struct LexicalIndexHandle {
	state: RwLock<LexicalState>,
}

impl Default for LexicalIndexHandle {
	fn default() -> Self { Self { state: RwLock::new(LexicalState::Unbuilt) } }
}

impl LexicalIndexHandle {
	pub fn new() -> Self { Self::default() }

	pub fn with_index(index: LexicalIndex) -> Self {
		Self { state: RwLock::new(LexicalState::Ready(Arc::new(index))) }
	}

	/// Open the persisted index under `dir`. Never fails: a missing index
	/// leaves the handle unbuilt, a malformed one marks it malformed.
	pub fn open(dir: &Path) -> Self {
		let handle = Self::new();
		match LexicalIndex::load(dir) {
			Ok(index) => handle.install(index),
			Err(Error::IndexUnavailable(reason)) => warn!(%reason, "lexical index unavailable, serving dense-only"),
			Err(e) => handle.mark_malformed(e.to_string()),
		}
		handle
	}

	/// Snapshot of the serving index, if one is ready.
	pub fn current(&self) -> Option<Arc<LexicalIndex>> {
		match &*self.state.read().unwrap_or_else(|p| p.into_inner()) {
			LexicalState::Ready(index) => Some(Arc::clone(index)),
			LexicalState::Unbuilt | LexicalState::Malformed(_) => None,
		}
	}

	pub fn status(&self) -> LexicalStatus {
		match &*self.state.read().unwrap_or_else(|p| p.into_inner()) {
			LexicalState::Unbuilt => LexicalStatus::Unbuilt,
			LexicalState::Ready(index) => LexicalStatus::Ready { children: index.len() },
			LexicalState::Malformed(reason) => LexicalStatus::Malformed { reason: reason.clone() },
		}
	}

	pub fn install(&self, index: LexicalIndex) {
		let children = index.len();
		*self.state.write().unwrap_or_else(|p| p.into_inner()) = LexicalState::Ready(Arc::new(index));
		info!(children, "lexical index installed");
	}

	pub fn mark_malformed(&self, reason: impl Into<String>) {
		let reason = reason.into();
		error!(%reason, "lexical index malformed, degraded until rebuilt");
		*self.state.write().unwrap_or_else(|p| p.into_inner()) = LexicalState::Malformed(reason);
	}

	/// Search the serving index; empty when there is none.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<RankedCandidate>> {
		match self.current() {
			Some(index) => index.search(query, k),
			None => Ok(Vec::new()),
		}
	}
}
