use async_trait::async_trait;
use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaForSequenceClassification};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use docsearch_core::traits::Reranker;

use crate::device::select_device;
use crate::error::Result;
use crate::tokenize::{encode_pairs, load_tokenizer};
use crate::weights::{ensure_dir, load_config, load_var_builder};

/// Pairs per forward pass.
const RERANK_BATCH: usize = 16;

struct Inner {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
}

impl Inner {
    fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(RERANK_BATCH) {
            let enc = encode_pairs(&self.tokenizer, query, batch, &self.device)?;
            let logits = self.model.forward(&enc.input_ids, &enc.attention_mask, &enc.token_type_ids)?;
            let probs = candle_nn::ops::sigmoid(&logits.to_dtype(DType::F32)?)?;
            out.extend(probs.to_device(&Device::Cpu)?.flatten_all()?.to_vec1::<f32>()?);
        }
        Ok(out)
    }
}

/// Single-logit XLM-RoBERTa cross-encoder (bge-reranker style). Scores are
/// sigmoid probabilities, aligned with the candidate order.
#[derive(Clone)]
pub struct CrossEncoderReranker {
    inner: Arc<Inner>,
}

impl CrossEncoderReranker {
    pub fn load(dir: &Path, max_len: usize) -> Result<Self> {
        ensure_dir(dir)?;
        let start = Instant::now();
        let device = select_device();
        let tokenizer = load_tokenizer(dir, max_len)?;
        let (config, _): (XLMRobertaConfig, _) = load_config(dir)?;
        let vb = load_var_builder(dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)?;
        info!(dir = %dir.display(), max_len, elapsed_ms = start.elapsed().as_millis() as u64, "cross-encoder loaded");
        Ok(Self { inner: Arc::new(Inner { model, tokenizer, device }) })
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>> {
        if candidates.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let inner = Arc::clone(&self.inner);
        let (query, owned) = (query.to_string(), candidates.to_vec());
        let scores = tokio::task::spawn_blocking(move || inner.score(&query, &owned)).await??;
        debug!(pairs = candidates.len(), elapsed_ms = start.elapsed().as_millis() as u64, "cross-encoder scored");
        Ok(scores)
    }
}
