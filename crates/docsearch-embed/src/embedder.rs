use async_trait::async_trait;
use candle_core::Device;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use docsearch_core::traits::Embedder;

use crate::device::select_device;
use crate::error::{ModelError, Result};
use crate::pool::masked_mean_l2;
use crate::tokenize::{encode_texts, load_tokenizer};
use crate::weights::{ensure_dir, load_config, load_var_builder};

/// Texts per forward pass.
const EMBED_BATCH: usize = 16;

struct Inner {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl Inner {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH) {
            let enc = encode_texts(&self.tokenizer, batch, &self.device)?;
            let hidden = self.model.forward(&enc.input_ids, &enc.attention_mask, &enc.token_type_ids, None, None, None)?;
            let pooled = masked_mean_l2(&hidden, &enc.attention_mask)?;
            out.extend(pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?);
        }
        Ok(out)
    }
}

/// Dense sentence embeddings from an XLM-RoBERTa checkpoint (BGE-M3 by
/// default): masked mean pooling followed by L2 normalization.
#[derive(Clone)]
pub struct XlmRobertaEmbedder {
    inner: Arc<Inner>,
    dim: usize,
    max_len: usize,
}

impl XlmRobertaEmbedder {
    pub fn load(dir: &Path, max_len: usize) -> Result<Self> {
        ensure_dir(dir)?;
        let start = Instant::now();
        let device = select_device();
        let tokenizer = load_tokenizer(dir, max_len)?;
        let (config, raw): (XLMRobertaConfig, _) = load_config(dir)?;
        let dim = raw
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ModelError::Shape("config.json has no hidden_size".into()))? as usize;
        let vb = load_var_builder(dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dir = %dir.display(), dim, max_len, elapsed_ms = start.elapsed().as_millis() as u64, "embedding model loaded");
        Ok(Self { inner: Arc::new(Inner { model, tokenizer, device }), dim, max_len })
    }
}

#[async_trait]
impl Embedder for XlmRobertaEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { self.max_len }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let inner = Arc::clone(&self.inner);
        let owned = texts.to_vec();
        let out = tokio::task::spawn_blocking(move || inner.embed(&owned)).await??;
        debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_dir_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = XlmRobertaEmbedder::load(&tmp.path().join("absent"), 64).err().unwrap();
        assert!(matches!(err, ModelError::MissingModelDir(_)));
    }
}
