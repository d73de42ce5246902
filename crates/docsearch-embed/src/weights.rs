use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::{ModelError, Result};

/// Parse `config.json` in `dir` as `T`, also returning the raw document for
/// fields the typed config does not expose.
pub fn load_config<T: DeserializeOwned>(dir: &Path) -> Result<(T, serde_json::Value)> {
    let path = dir.join("config.json");
    if !path.exists() {
        return Err(ModelError::MissingFile(path));
    }
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let config = serde_json::from_value(raw.clone())?;
    Ok((config, raw))
}

/// F32 weights from `model.safetensors`, falling back to `pytorch_model.bin`.
pub fn load_var_builder(dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = dir.join("model.safetensors");
    let pickle = dir.join("pytorch_model.bin");
    let tensors: HashMap<String, Tensor> = if safetensors.exists() {
        debug!(path = %safetensors.display(), "loading safetensors weights");
        candle_core::safetensors::load(&safetensors, device)?
    } else if pickle.exists() {
        debug!(path = %pickle.display(), "loading pickle weights");
        candle_core::pickle::read_all(&pickle)?.into_iter().collect()
    } else {
        return Err(ModelError::MissingFile(safetensors));
    };
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() { Ok(()) } else { Err(ModelError::MissingModelDir(dir.to_path_buf())) }
}
