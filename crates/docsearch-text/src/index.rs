use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info, warn};

use docsearch_core::error::{Error, Result, Stage};
use docsearch_core::types::{Chunk, RankedCandidate, ScoreStage};

use crate::sidecar::{self, SidecarEntry};
use crate::tantivy_utils::{build_schema, register_tokenizer, tokenize, ChildFields};

/// Names the generation directory currently in service.
pub const CURRENT_FILE: &str = "CURRENT";
pub const SIDECAR_FILE: &str = "sidecar.json";
pub const MANIFEST_FILE: &str = "manifest.json";
const TANTIVY_DIR: &str = "tantivy";
const GENERATION_PREFIX: &str = "gen-";
const WRITER_HEAP_BYTES: usize = 100_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Manifest {
	children: usize,
	sidecar_digest: String,
}

fn engine(e: impl Display) -> Error { Error::upstream(Stage::Lexical, e) }

fn malformed(path: &Path, e: impl Display) -> Error { Error::MalformedIndex(format!("{}: {e}", path.display())) }

/// Immutable BM25 index over child chunks, backed by tantivy.
///
/// Every tantivy document stores its build ordinal; the sidecar entry at
/// position `i` is the child behind ordinal `i`.
pub struct LexicalIndex {
	index: Index,
	reader: IndexReader,
	fields: ChildFields,
	sidecar: Vec<SidecarEntry>,
}

impl LexicalIndex {
	/// Build in memory over the children of `chunks`, in slice order.
	pub fn build(chunks: &[Chunk]) -> Result<Self> {
		Self::populate(Index::create_in_ram(build_schema()), chunks)
	}

	/// Build into a fresh generation directory under `dir`, then make it the
	/// current one with a single rename of the `CURRENT` pointer. Older
	/// generations are removed afterwards.
	pub fn build_in(dir: &Path, chunks: &[Chunk]) -> Result<Self> {
		fs::create_dir_all(dir)?;
		let generation = next_generation(dir)?;
		let gen_dir = dir.join(&generation);
		let tantivy_dir = gen_dir.join(TANTIVY_DIR);
		fs::create_dir_all(&tantivy_dir)?;
		let built = Self::populate(Index::create_in_dir(&tantivy_dir, build_schema()).map_err(engine)?, chunks)?;

		let manifest = Manifest { children: built.len(), sidecar_digest: sidecar::digest(&built.sidecar)? };
		fs::write(gen_dir.join(SIDECAR_FILE), serde_json::to_vec(&built.sidecar)?)?;
		fs::write(gen_dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest)?)?;
		write_atomic(&dir.join(CURRENT_FILE), generation.as_bytes())?;
		prune_generations(dir, &generation);
		info!(dir = %dir.display(), %generation, children = built.len(), "persisted lexical index");
		Ok(built)
	}

	fn populate(index: Index, chunks: &[Chunk]) -> Result<Self> {
		register_tokenizer(&index);
		let fields = ChildFields::resolve(&index.schema()).map_err(engine)?;
		let children: Vec<&Chunk> = chunks.iter().filter(|c| c.is_child()).collect();

		// One indexing thread and one commit: a single segment in build order.
		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(engine)?;
		for (ordinal, c) in children.iter().enumerate() {
			writer
				.add_document(doc!(
					fields.ordinal => ordinal as u64,
					fields.chunk_id => c.id.clone(),
					fields.text => c.text.clone(),
				))
				.map_err(engine)?;
		}
		writer.commit().map_err(engine)?;
		writer.wait_merging_threads().map_err(engine)?;

		let sidecar = children
			.iter()
			.map(|c| SidecarEntry { doc_id: c.doc_id.clone(), page: c.page, chunk_id: c.id.clone() })
			.collect::<Vec<_>>();
		let reader = open_reader(&index)?;
		info!(children = sidecar.len(), skipped_parents = chunks.len() - children.len(), "built lexical index");
		Ok(Self { index, reader, fields, sidecar })
	}

	/// Load the current generation under `dir`. A missing pointer means the
	/// index was never built (`IndexUnavailable`); anything unreadable or
	/// misaligned is `MalformedIndex`.
	pub fn load(dir: &Path) -> Result<Self> {
		let gen_dir = current_generation(dir)?;
		let manifest: Manifest = read_json(&gen_dir.join(MANIFEST_FILE))?;
		let sidecar: Vec<SidecarEntry> = read_json(&gen_dir.join(SIDECAR_FILE))?;
		let tantivy_dir = gen_dir.join(TANTIVY_DIR);
		let index = Index::open_in_dir(&tantivy_dir).map_err(|e| malformed(&tantivy_dir, e))?;
		register_tokenizer(&index);
		let fields = ChildFields::resolve(&index.schema()).map_err(|e| malformed(&tantivy_dir, e))?;
		let reader = open_reader(&index)?;
		let loaded = Self { index, reader, fields, sidecar };
		loaded.verify(&manifest)?;
		info!(dir = %gen_dir.display(), children = loaded.len(), "loaded lexical index");
		Ok(loaded)
	}

	/// Sidecar and tantivy documents must describe the same children in the
	/// same order.
	fn verify(&self, manifest: &Manifest) -> Result<()> {
		let n = self.sidecar.len();
		if manifest.children != n {
			return Err(Error::MalformedIndex(format!("manifest lists {} children but sidecar has {n} entries", manifest.children)));
		}
		if sidecar::digest(&self.sidecar)? != manifest.sidecar_digest {
			return Err(Error::MalformedIndex("sidecar digest does not match manifest".into()));
		}
		let searcher = self.reader.searcher();
		if searcher.num_docs() as usize != n {
			return Err(Error::MalformedIndex(format!("index holds {} documents but sidecar has {n} entries", searcher.num_docs())));
		}
		for (segment_ord, segment) in searcher.segment_readers().iter().enumerate() {
			for doc_id in 0..segment.max_doc() {
				self.resolve(&searcher, DocAddress::new(segment_ord as u32, doc_id))?;
			}
		}
		Ok(())
	}

	/// Ordinal and sidecar entry of one stored document.
	fn resolve(&self, searcher: &Searcher, addr: DocAddress) -> Result<(usize, &SidecarEntry)> {
		let doc: TantivyDocument = searcher.doc(addr).map_err(engine)?;
		let ordinal = doc.get_first(self.fields.ordinal).and_then(|v| v.as_u64());
		let chunk_id = doc.get_first(self.fields.chunk_id).and_then(|v| v.as_str());
		let (Some(ordinal), Some(chunk_id)) = (ordinal, chunk_id) else {
			return Err(Error::MalformedIndex(format!("document {addr:?} lacks its ordinal or chunk id")));
		};
		match self.sidecar.get(ordinal as usize) {
			Some(entry) if entry.chunk_id == chunk_id => Ok((ordinal as usize, entry)),
			_ => Err(Error::MalformedIndex(format!("child '{chunk_id}' at ordinal {ordinal} is not aligned with the sidecar"))),
		}
	}

	pub fn len(&self) -> usize { self.sidecar.len() }

	pub fn is_empty(&self) -> bool { self.sidecar.is_empty() }

	pub fn sidecar(&self) -> &[SidecarEntry] { &self.sidecar }

	/// Top `k` children for `query`, best first. Scores are positive and equal
	/// scores keep build order. A query with no surviving token yields an
	/// empty list.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<RankedCandidate>> {
		if k == 0 || self.is_empty() {
			return Ok(Vec::new());
		}
		let mut analyzer = self.index.tokenizer_for_field(self.fields.text).map_err(engine)?;
		let mut terms = tokenize(&mut analyzer, query);
		terms.sort_unstable();
		terms.dedup();
		if terms.is_empty() {
			debug!(query, "no lexical terms in query");
			return Ok(Vec::new());
		}
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let term = Term::from_field_text(self.fields.text, t);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&BooleanQuery::new(clauses), &TopDocs::with_limit(k)).map_err(engine)?;

		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			if score <= 0.0 {
				continue;
			}
			let (ordinal, entry) = self.resolve(&searcher, addr)?;
			hits.push((ordinal, RankedCandidate::new(entry.chunk_id.clone(), score, ScoreStage::Lexical)));
		}
		hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
		Ok(hits.into_iter().map(|(_, hit)| hit).collect())
	}
}

fn open_reader(index: &Index) -> Result<IndexReader> {
	index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(engine)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
	let bytes = fs::read(path).map_err(|e| malformed(path, e))?;
	serde_json::from_slice(&bytes).map_err(|e| malformed(path, e))
}

fn generation_number(name: &str) -> Option<u64> { name.strip_prefix(GENERATION_PREFIX)?.parse().ok() }

/// Directory of the generation `CURRENT` points at.
pub fn current_generation(dir: &Path) -> Result<PathBuf> {
	let pointer = dir.join(CURRENT_FILE);
	if !pointer.exists() {
		return Err(Error::IndexUnavailable(format!("no lexical index at {}", dir.display())));
	}
	let name = fs::read_to_string(&pointer)?;
	let name = name.trim();
	if generation_number(name).is_none() {
		return Err(malformed(&pointer, format!("'{name}' is not a generation")));
	}
	Ok(dir.join(name))
}

fn next_generation(dir: &Path) -> Result<String> {
	let mut latest = 0;
	for entry in fs::read_dir(dir)? {
		if let Some(n) = entry?.file_name().to_str().and_then(generation_number) {
			latest = latest.max(n);
		}
	}
	Ok(format!("{GENERATION_PREFIX}{:06}", latest + 1))
}

/// Remove every generation but `keep`, including leftovers of builds that
/// never became current.
fn prune_generations(dir: &Path, keep: &str) {
	let Ok(entries) = fs::read_dir(dir) else { return };
	for entry in entries.flatten() {
		let name = entry.file_name();
		let Some(name) = name.to_str() else { continue };
		if name == keep || generation_number(name).is_none() {
			continue;
		}
		if let Err(e) = fs::remove_dir_all(entry.path()) {
			warn!(generation = name, error = %e, "could not remove old lexical generation");
		}
	}
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
	let tmp = path.with_extension("tmp");
	fs::write(&tmp, bytes)?;
	fs::rename(&tmp, path)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn corpus() -> Vec<Chunk> {
		vec![
			Chunk::parent("p1", "code", 1, "Section salaires minimum wage and overtime"),
			Chunk::child("c1", "p1", "code", 1, "The minimum wage is revised every year"),
			Chunk::child("c2", "p1", "code", 1, "Overtime hours are paid at a higher wage"),
			Chunk::child("c3", "p2", "code", 2, "Annual leave lasts five weeks"),
		]
	}

	fn ids(hits: Vec<RankedCandidate>) -> Vec<String> { hits.into_iter().map(|h| h.id).collect() }

	fn rewrite_sidecar(dir: &Path, edit: impl FnOnce(&mut Vec<SidecarEntry>), fix_digest: bool) {
		let gen_dir = current_generation(dir).unwrap();
		let mut side: Vec<SidecarEntry> = read_json(&gen_dir.join(SIDECAR_FILE)).unwrap();
		edit(&mut side);
		fs::write(gen_dir.join(SIDECAR_FILE), serde_json::to_vec(&side).unwrap()).unwrap();
		if fix_digest {
			let manifest = Manifest { children: side.len(), sidecar_digest: sidecar::digest(&side).unwrap() };
			fs::write(gen_dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();
		}
	}

	#[test]
	fn indexes_children_only() {
		let idx = LexicalIndex::build(&corpus()).unwrap();
		assert_eq!(idx.len(), 3);
		assert!(idx.sidecar().iter().all(|e| e.chunk_id.starts_with('c')));
		assert!(idx.search("section salaires", 10).unwrap().is_empty());
	}

	#[test]
	fn ranks_best_match_first() {
		let idx = LexicalIndex::build(&corpus()).unwrap();
		let hits = idx.search("minimum wage", 10).unwrap();
		assert_eq!(hits[0].id, "c1");
		assert_eq!(hits.len(), 2);
		assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
		assert!(hits.iter().all(|h| h.score > 0.0 && h.stage == ScoreStage::Lexical));
	}

	#[test]
	fn equal_scores_keep_build_order() {
		let chunks = vec![
			Chunk::child("z", "p", "d", 1, "holiday pay"),
			Chunk::child("a", "p", "d", 1, "holiday pay"),
			Chunk::child("m", "p", "d", 1, "holiday pay"),
		];
		let idx = LexicalIndex::build(&chunks).unwrap();
		for _ in 0..3 {
			assert_eq!(ids(idx.search("holiday", 3).unwrap()), vec!["z", "a", "m"]);
		}
		assert_eq!(ids(idx.search("holiday", 2).unwrap()), vec!["z", "a"]);
	}

	#[test]
	fn empty_query_returns_empty_list() {
		let idx = LexicalIndex::build(&corpus()).unwrap();
		assert!(idx.search("", 10).unwrap().is_empty());
		assert!(idx.search("a an of", 10).unwrap().is_empty());
		assert!(idx.search("wage", 0).unwrap().is_empty());
		assert!(LexicalIndex::build(&[]).unwrap().search("wage", 5).unwrap().is_empty());
	}

	#[test]
	fn query_syntax_is_plain_text() {
		let idx = LexicalIndex::build(&corpus()).unwrap();
		assert_eq!(ids(idx.search("text:\"minimum\" AND (wage", 10).unwrap())[0], "c1");
	}

	#[test]
	fn persisted_index_answers_identically() {
		let tmp = TempDir::new().unwrap();
		let idx = LexicalIndex::build_in(tmp.path(), &corpus()).unwrap();
		let loaded = LexicalIndex::load(tmp.path()).unwrap();
		assert_eq!(loaded.sidecar(), idx.sidecar());
		assert_eq!(loaded.search("overtime wage", 5).unwrap(), idx.search("overtime wage", 5).unwrap());
	}

	#[test]
	fn rebuild_switches_generation_and_prunes_the_old_one() {
		let tmp = TempDir::new().unwrap();
		LexicalIndex::build_in(tmp.path(), &corpus()).unwrap();
		let first = current_generation(tmp.path()).unwrap();
		LexicalIndex::build_in(tmp.path(), &[Chunk::child("c9", "p3", "code", 4, "Maternity leave")]).unwrap();
		let second = current_generation(tmp.path()).unwrap();
		assert_ne!(first, second);
		assert!(!first.exists());
		assert_eq!(ids(LexicalIndex::load(tmp.path()).unwrap().search("maternity", 5).unwrap()), vec!["c9"]);
	}

	#[test]
	fn interrupted_build_leaves_previous_generation_current() {
		let tmp = TempDir::new().unwrap();
		LexicalIndex::build_in(tmp.path(), &corpus()).unwrap();
		let half_written = tmp.path().join("gen-000002");
		fs::create_dir_all(half_written.join(TANTIVY_DIR)).unwrap();
		fs::write(half_written.join(SIDECAR_FILE), "[]").unwrap();
		let loaded = LexicalIndex::load(tmp.path()).unwrap();
		assert_eq!(loaded.len(), 3);
		assert_eq!(next_generation(tmp.path()).unwrap(), "gen-000003");
	}

	#[test]
	fn truncated_sidecar_is_malformed() {
		let tmp = TempDir::new().unwrap();
		LexicalIndex::build_in(tmp.path(), &corpus()).unwrap();
		rewrite_sidecar(tmp.path(), |s| { s.pop(); }, false);
		assert!(matches!(LexicalIndex::load(tmp.path()), Err(Error::MalformedIndex(_))));
	}

	#[test]
	fn reordered_sidecar_is_malformed() {
		let tmp = TempDir::new().unwrap();
		LexicalIndex::build_in(tmp.path(), &corpus()).unwrap();
		rewrite_sidecar(tmp.path(), |s| s.swap(0, 1), false);
		assert!(matches!(LexicalIndex::load(tmp.path()), Err(Error::MalformedIndex(_))));
	}

	#[test]
	fn sidecar_out_of_step_with_documents_is_malformed() {
		let tmp = TempDir::new().unwrap();
		LexicalIndex::build_in(tmp.path(), &corpus()).unwrap();
		rewrite_sidecar(tmp.path(), |s| s.swap(0, 1), true);
		let err = LexicalIndex::load(tmp.path()).err().unwrap();
		assert!(matches!(err, Error::MalformedIndex(ref m) if m.contains("not aligned")));
	}

	#[test]
	fn missing_pointer_means_unavailable() {
		let tmp = TempDir::new().unwrap();
		assert!(matches!(LexicalIndex::load(tmp.path()), Err(Error::IndexUnavailable(_))));
	}
}
