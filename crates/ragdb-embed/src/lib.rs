//! Embedding backends implementing the [`Embedder`] capability.
//!
//! Two implementations: a candle-based sentence-transformer
//! ([`BertEmbedder`]) loading a MiniLM-class model from a local directory,
//! and a deterministic hashing embedder ([`HashEmbedder`]) for tests and
//! offline runs. `default_embedder` picks between them via
//! `APP_USE_FAKE_EMBEDDINGS`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::info;

use ragdb_core::config::Settings;
use ragdb_core::error::EmbeddingError;
use ragdb_core::traits::Embedder;

pub mod pool;
pub use pool::masked_mean_l2;

/// Sequence length every input is padded or truncated to.
const MAX_SEQ_LEN: usize = 256;
/// BERT `[PAD]` token id.
const PAD_TOKEN_ID: u32 = 0;

/// Candle-backed BERT sentence embedder with masked mean pooling.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl BertEmbedder {
    /// Load tokenizer, config, and weights from a local model directory.
    ///
    /// The directory is resolved from `APP_MODEL_DIR`, `MODEL_DIR`, or a
    /// `models/<model-name>` folder next to the working directory.
    pub fn new(model_name: &str, expected_dim: usize) -> Result<Self, EmbeddingError> {
        let device = default_device();
        let model_dir = resolve_model_dir(model_name)?;
        info!(dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EmbeddingError::ModelUnavailable {
                path: tokenizer_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let config_path = model_dir.join("config.json");
        let config_raw =
            std::fs::read_to_string(&config_path).map_err(|e| EmbeddingError::ModelUnavailable {
                path: config_path.clone(),
                reason: e.to_string(),
            })?;
        let config: BertConfig =
            serde_json::from_str(&config_raw).map_err(|e| EmbeddingError::ModelUnavailable {
                path: config_path.clone(),
                reason: e.to_string(),
            })?;

        let vb = load_weights(&model_dir, &device)?;
        let model = BertModel::load(vb, &config).map_err(|e| EmbeddingError::ModelUnavailable {
            path: model_dir.clone(),
            reason: e.to_string(),
        })?;
        info!(model = model_name, dim = expected_dim, "embedding model ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            dim: expected_dim,
        })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text_len = text.chars().count();
        let infer = |reason: String| EmbeddingError::Inference { text_len, reason };

        let enc = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| infer(e.to_string()))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        if ids.len() > MAX_SEQ_LEN {
            ids.truncate(MAX_SEQ_LEN);
            mask.truncate(MAX_SEQ_LEN);
        }
        if ids.len() < MAX_SEQ_LEN {
            let pad = MAX_SEQ_LEN - ids.len();
            ids.extend(std::iter::repeat(PAD_TOKEN_ID).take(pad));
            mask.extend(std::iter::repeat(0).take(pad));
        }

        let run = || -> candle_core::Result<Vec<f32>> {
            let input_ids = Tensor::from_iter(ids.iter().copied(), &self.device)?
                .reshape((1, MAX_SEQ_LEN))?;
            let attention_mask = Tensor::from_iter(mask.iter().copied(), &self.device)?
                .reshape((1, MAX_SEQ_LEN))?;
            let token_type_ids = Tensor::zeros((1, MAX_SEQ_LEN), DType::U32, &self.device)?;
            let hidden = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
            let pooled = masked_mean_l2(&hidden, &attention_mask)?;
            pooled.squeeze(0)?.to_vec1()
        };
        let embedding = run().map_err(|e| infer(e.to_string()))?;
        if embedding.len() != self.dim {
            return Err(infer(format!(
                "model produced {} dims, expected {}",
                embedding.len(),
                self.dim
            )));
        }
        Ok(embedding)
    }
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }
        self.embed_one(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let valid = non_blank(texts)?;
        valid.iter().map(|t| self.embed_one(t)).collect()
    }
}

/// Deterministic hashing embedder. No model, no I/O; vectors are stable
/// across runs for the same input and L2-normalized.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }
        Ok(self.vector(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let valid = non_blank(texts)?;
        Ok(valid.iter().map(|t| self.vector(t)).collect())
    }
}

/// Drop blank entries, erroring when the batch is empty or nothing survives.
fn non_blank(texts: &[String]) -> Result<Vec<&String>, EmbeddingError> {
    if texts.is_empty() {
        return Err(EmbeddingError::EmptyBatch { submitted: 0 });
    }
    let valid: Vec<&String> = texts.iter().filter(|t| !t.trim().is_empty()).collect();
    if valid.len() != texts.len() {
        tracing::warn!(dropped = texts.len() - valid.len(), "blank texts ignored");
    }
    if valid.is_empty() {
        return Err(EmbeddingError::EmptyBatch {
            submitted: texts.len(),
        });
    }
    Ok(valid)
}

/// Build the embedder selected by the environment: the hashing fake when
/// `APP_USE_FAKE_EMBEDDINGS` is set, the candle model otherwise.
pub fn default_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        info!("using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.embedding_dimension)));
    }
    Ok(Arc::new(BertEmbedder::new(
        &settings.embedding_model,
        settings.embedding_dimension,
    )?))
}

fn default_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }
    Device::Cpu
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>, EmbeddingError> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // Mmap is sound here as long as nothing rewrites the file mid-run.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[safetensors.clone()], DTYPE, device)
        }
        .map_err(|e| EmbeddingError::ModelUnavailable {
            path: safetensors,
            reason: e.to_string(),
        })?;
        return Ok(vb);
    }

    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let tensors =
            candle_core::pickle::read_all(&pickle).map_err(|e| EmbeddingError::ModelUnavailable {
                path: pickle.clone(),
                reason: e.to_string(),
            })?;
        let tensors: std::collections::HashMap<String, Tensor> = tensors.into_iter().collect();
        return Ok(VarBuilder::from_tensors(tensors, DTYPE, device));
    }

    Err(EmbeddingError::ModelUnavailable {
        path: model_dir.to_path_buf(),
        reason: "no model.safetensors or pytorch_model.bin".to_string(),
    })
}

/// Locate the on-disk model directory for `model_name`.
fn resolve_model_dir(model_name: &str) -> Result<PathBuf, EmbeddingError> {
    let short_name = model_name.rsplit('/').next().unwrap_or(model_name);

    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                return Ok(p);
            }
        }
    }
    for base in ["models", "../models"] {
        let p = Path::new(base).join(short_name);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(EmbeddingError::ModelUnavailable {
        path: PathBuf::from("models").join(short_name),
        reason: format!("could not locate model directory for {model_name}"),
    })
}
