// engine.rs — Candle BERT embedding engine with attention-mask-aware mean pooling.
//
// Loads a sentence-transformers BERT checkpoint (all-MiniLM-L6-v2 by default) from
// safetensors and produces L2-normalized sentence embeddings, matching the
// sentence-transformers defaults.

use std::path::Path;

use anyhow::{bail, Context};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use crate::config;
use crate::embeddings::{DeviceHint, Embedder};

/// The embedding engine holds the loaded model and tokenizer.
pub struct EmbeddingEngine {
    model_name: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dims: usize,
}

impl EmbeddingEngine {
    /// Load the model from a local directory containing model.safetensors,
    /// tokenizer.json, and config.json.
    pub fn load(model_name: &str, model_dir: &Path, hint: DeviceHint) -> anyhow::Result<Self> {
        let device = select_device(hint);

        let config_path = model_dir.join("config.json");
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let bert_config: BertConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("parse {}", config_path.display()))?;

        log::info!(
            "Loading embedding model {}: hidden_size={}, layers={}, heads={}",
            model_name,
            bert_config.hidden_size,
            bert_config.num_hidden_layers,
            bert_config.num_attention_heads,
        );

        let weights_path = model_dir.join("model.safetensors");
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
                .with_context(|| format!("load weights from {}", weights_path.display()))?
        };

        let model = BertModel::load(vb, &bert_config).context("load BERT model")?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        log::info!("Embedding model loaded (dims={})", bert_config.hidden_size);

        Ok(Self {
            model_name: model_name.to_string(),
            model,
            tokenizer,
            device,
            dims: bert_config.hidden_size,
        })
    }

    /// Generate a sentence embedding for the given text.
    pub fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dims]);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let token_ids = encoding.get_ids();
        let attention_mask = encoding.get_attention_mask();

        let len = token_ids.len().min(config::embedding::MAX_TOKENS);
        let token_ids = &token_ids[..len];
        let attention_mask = &attention_mask[..len];

        // [1, seq_len]
        let token_ids_t = Tensor::new(
            token_ids.iter().map(|&id| id as i64).collect::<Vec<_>>().as_slice(),
            &self.device,
        )?
        .unsqueeze(0)?;

        let attention_mask_t = Tensor::new(
            attention_mask.iter().map(|&m| m as i64).collect::<Vec<_>>().as_slice(),
            &self.device,
        )?
        .unsqueeze(0)?;

        let token_type_ids = token_ids_t.zeros_like()?;

        // [1, seq_len, hidden_size]
        let output = self
            .model
            .forward(&token_ids_t, &token_type_ids, Some(&attention_mask_t))?;

        let embedding = mean_pooling(&output, &attention_mask_t)?;
        let embedding = l2_normalize(&embedding)?;

        let emb_vec: Vec<f32> = embedding.squeeze(0)?.to_vec1()?;

        if emb_vec.len() != self.dims {
            bail!("unexpected embedding dims: got {}, expected {}", emb_vec.len(), self.dims);
        }

        Ok(emb_vec)
    }
}

impl Embedder for EmbeddingEngine {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        // One at a time: candle batching with variable lengths needs padding we don't want here.
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

fn select_device(hint: DeviceHint) -> Device {
    let attempt = match hint {
        DeviceHint::Cpu => return Device::Cpu,
        DeviceHint::Cuda => Device::new_cuda(0),
        DeviceHint::Metal => Device::new_metal(0),
    };
    match attempt {
        Ok(device) => {
            log::info!("Using {:?} for embedding inference", hint);
            device
        }
        Err(e) => {
            log::warn!("{:?} requested but not available ({}). Using CPU instead.", hint, e);
            Device::Cpu
        }
    }
}

/// Attention-mask-aware mean pooling.
///
/// input_embeds: [batch, seq_len, hidden_size]
/// attention_mask: [batch, seq_len] (1 for real tokens, 0 for padding)
/// output: [batch, hidden_size]
fn mean_pooling(input_embeds: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
    let mask_expanded = attention_mask
        .to_dtype(DType::F32)?
        .unsqueeze(2)?
        .broadcast_as(input_embeds.shape())?;

    let sum_embeddings = (input_embeds * &mask_expanded)?.sum(1)?;

    // clamp to avoid div by zero
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

    Ok((sum_embeddings / sum_mask)?)
}

/// L2 normalize a tensor along the last dimension.
fn l2_normalize(tensor: &Tensor) -> anyhow::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.clamp(1e-12, f64::MAX)?;
    Ok(tensor.broadcast_div(&norm)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pooling_ignores_masked_tokens() {
        let device = Device::Cpu;
        // [1, 3, 2]: the last token is padding and must not affect the mean.
        let embeds = Tensor::new(&[[[1.0f32, 2.0], [3.0, 4.0], [100.0, 100.0]]], &device).unwrap();
        let mask = Tensor::new(&[[1i64, 1, 0]], &device).unwrap();
        let pooled: Vec<f32> = mean_pooling(&embeds, &mask).unwrap().squeeze(0).unwrap().to_vec1().unwrap();
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let device = Device::Cpu;
        let t = Tensor::new(&[[3.0f32, 4.0]], &device).unwrap();
        let v: Vec<f32> = l2_normalize(&t).unwrap().squeeze(0).unwrap().to_vec1().unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_cpu_hint_selects_cpu() {
        assert!(matches!(select_device(DeviceHint::Cpu), Device::Cpu));
    }
}
