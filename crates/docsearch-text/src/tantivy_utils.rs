use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, Token, TokenFilter, TokenStream, Tokenizer};
use tantivy::{Index, TantivyError};

/// Tokens shorter than this many characters carry no lexical signal.
pub const MIN_TOKEN_CHARS: usize = 3;

pub const TOKENIZER_NAME: &str = "docsearch_text";

pub const ORDINAL_FIELD: &str = "ordinal";
pub const CHUNK_ID_FIELD: &str = "chunk_id";
pub const TEXT_FIELD: &str = "text";

/// Resolved fields of the child schema.
#[derive(Debug, Clone, Copy)]
pub struct ChildFields {
	pub ordinal: Field,
	pub chunk_id: Field,
	pub text: Field,
}

impl ChildFields {
	pub fn resolve(schema: &Schema) -> Result<Self, TantivyError> {
		Ok(Self {
			ordinal: schema.get_field(ORDINAL_FIELD)?,
			chunk_id: schema.get_field(CHUNK_ID_FIELD)?,
			text: schema.get_field(TEXT_FIELD)?,
		})
	}
}

/// One tantivy document per child: its build ordinal, its id, and its text
/// (indexed with term frequencies for BM25, not stored).
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_u64_field(ORDINAL_FIELD, STORED);
	schema_builder.add_text_field(CHUNK_ID_FIELD, STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqs);
	schema_builder.add_text_field(TEXT_FIELD, TextOptions::default().set_indexing_options(text_field_indexing));
	schema_builder.build()
}

pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(RemoveShortFilter::limit(MIN_TOKEN_CHARS))
		.build()
}

/// Must run on every `Index` handle, freshly created or reopened.
pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(TOKENIZER_NAME, build_analyzer());
}

/// Lower-cased word tokens of `text` as the index sees them.
pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut stream = analyzer.token_stream(text);
	let mut tokens = Vec::new();
	while stream.advance() {
		tokens.push(stream.token().text.clone());
	}
	tokens
}

/// Drops tokens with fewer than `min_chars` characters.
#[derive(Clone)]
pub struct RemoveShortFilter {
	min_chars: usize,
}

impl RemoveShortFilter {
	pub fn limit(min_chars: usize) -> Self { Self { min_chars } }
}

impl TokenFilter for RemoveShortFilter {
	type Tokenizer<T: Tokenizer> = RemoveShortFilterWrapper<T>;

	fn transform<T: Tokenizer>(self, tokenizer: T) -> RemoveShortFilterWrapper<T> {
		RemoveShortFilterWrapper { min_chars: self.min_chars, inner: tokenizer }
	}
}

#[derive(Clone)]
pub struct RemoveShortFilterWrapper<T: Tokenizer> {
	min_chars: usize,
	inner: T,
}

impl<T: Tokenizer> Tokenizer for RemoveShortFilterWrapper<T> {
	type TokenStream<'a> = RemoveShortFilterStream<T::TokenStream<'a>>;

	fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
		RemoveShortFilterStream { min_chars: self.min_chars, tail: self.inner.token_stream(text) }
	}
}

pub struct RemoveShortFilterStream<T> {
	min_chars: usize,
	tail: T,
}

impl<T: TokenStream> TokenStream for RemoveShortFilterStream<T> {
	fn advance(&mut self) -> bool {
		while self.tail.advance() {
			if self.tail.token().text.chars().count() >= self.min_chars {
				return true;
			}
		}
		false
	}

	fn token(&self) -> &Token { self.tail.token() }

	fn token_mut(&mut self) -> &mut Token { self.tail.token_mut() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lowercases_and_drops_short_tokens() {
		let mut a = build_analyzer();
		assert_eq!(tokenize(&mut a, "The Minimum Wage is set by law"), vec!["the", "minimum", "wage", "set", "law"]);
	}

	#[test]
	fn counts_characters_not_bytes() {
		let mut a = build_analyzer();
		// "été" is 3 chars but 5 bytes; "où" is 2 chars.
		assert_eq!(tokenize(&mut a, "Été où"), vec!["été"]);
	}

	#[test]
	fn punctuation_only_query_yields_nothing() {
		let mut a = build_analyzer();
		assert!(tokenize(&mut a, "?? -- a b").is_empty());
		assert!(tokenize(&mut a, "").is_empty());
	}

	#[test]
	fn schema_fields_resolve() {
		let fields = ChildFields::resolve(&build_schema()).unwrap();
		assert_ne!(fields.ordinal, fields.text);
	}
}
