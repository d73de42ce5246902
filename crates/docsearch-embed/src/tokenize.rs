use candle_core::{Device, Tensor};
use std::path::Path;
use tokenizers::tokenizer::{Encoding, Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};

use crate::error::{ModelError, Result};

/// XLM-RoBERTa `<pad>`.
pub const PAD_ID: u32 = 1;

/// Load `tokenizer.json` from `dir`, truncating inputs (or pairs, longest
/// side first) to `max_len` tokens.
pub fn load_tokenizer(dir: &Path, max_len: usize) -> Result<Tokenizer> {
    let path = dir.join("tokenizer.json");
    if !path.exists() {
        return Err(ModelError::MissingFile(path));
    }
    let mut tokenizer = Tokenizer::from_file(&path).map_err(|e| ModelError::Tokenizer(format!("{}: {e}", path.display())))?;
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_len,
            stride: 0,
            strategy: TruncationStrategy::LongestFirst,
            direction: TruncationDirection::Right,
        }))
        .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
    Ok(tokenizer)
}

/// `[B,T]` inputs padded to the longest row of the batch.
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

pub fn encode_texts(tokenizer: &Tokenizer, texts: &[String], device: &Device) -> Result<EncodedBatch> {
    let encodings = texts
        .iter()
        .map(|t| tokenizer.encode(t.as_str(), true).map_err(|e| ModelError::Tokenizer(e.to_string())))
        .collect::<Result<Vec<_>>>()?;
    pad_batch(&encodings, device)
}

/// Encode `(query, candidate)` pairs for a cross-encoder.
pub fn encode_pairs(tokenizer: &Tokenizer, query: &str, candidates: &[String], device: &Device) -> Result<EncodedBatch> {
    let encodings = candidates
        .iter()
        .map(|c| tokenizer.encode((query, c.as_str()), true).map_err(|e| ModelError::Tokenizer(e.to_string())))
        .collect::<Result<Vec<_>>>()?;
    pad_batch(&encodings, device)
}

fn pad_batch(encodings: &[Encoding], device: &Device) -> Result<EncodedBatch> {
    let rows = encodings.len();
    let width = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
    if rows == 0 || width == 0 {
        return Err(ModelError::Tokenizer("empty batch".into()));
    }
    let mut ids = Vec::with_capacity(rows * width);
    let mut mask = Vec::with_capacity(rows * width);
    let mut type_ids = Vec::with_capacity(rows * width);
    for enc in encodings {
        let pad = width - enc.get_ids().len();
        ids.extend_from_slice(enc.get_ids());
        ids.extend(std::iter::repeat(PAD_ID).take(pad));
        mask.extend_from_slice(enc.get_attention_mask());
        mask.extend(std::iter::repeat(0).take(pad));
        type_ids.extend_from_slice(enc.get_type_ids());
        type_ids.extend(std::iter::repeat(0).take(pad));
    }
    Ok(EncodedBatch {
        input_ids: Tensor::from_vec(ids, (rows, width), device)?,
        attention_mask: Tensor::from_vec(mask, (rows, width), device)?,
        token_type_ids: Tensor::from_vec(type_ids, (rows, width), device)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tokenizer_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(load_tokenizer(tmp.path(), 32), Err(ModelError::MissingFile(_))));
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(pad_batch(&[], &Device::Cpu).is_err());
    }
}
