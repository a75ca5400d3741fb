use std::env;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Typed configuration for the whole engine.
///
/// Values come from built-in defaults, overridden by `config.toml`, then
/// `config.<env>.toml` (selected by `RUST_ENV`), then `APP_*` environment
/// variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,

    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub embedding_batch_size: usize,
    pub normalize_embeddings: bool,

    /// Chunk size in tokens (1 token ~ 4 chars).
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, in tokens.
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,

    pub default_top_k: usize,
    pub min_similarity_score: f32,
    pub max_context_length: usize,

    pub data_dir: String,
    pub index_dir: String,
    pub vectors_file: String,
    pub chunks_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "ragdb".to_string(),
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_dimension: 384,
            embedding_batch_size: 32,
            normalize_embeddings: true,
            chunk_size: 300,
            chunk_overlap: 50,
            min_chunk_size: 50,
            max_chunk_size: 500,
            default_top_k: 5,
            min_similarity_score: 0.65,
            max_context_length: 2000,
            data_dir: "data/raw".to_string(),
            index_dir: "data/processed".to_string(),
            vectors_file: "vectors.json".to_string(),
            chunks_file: "chunks.json".to_string(),
        }
    }
}

impl Settings {
    /// Load and validate settings from defaults + config files + `APP_*` env.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_"));

        let settings: Settings = figment.extract().map_err(|e| Error::InvalidConfig {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject value combinations that would misbehave downstream.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_similarity_score) {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "min_similarity_score must be within [0, 1], got {}",
                    self.min_similarity_score
                ),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        if self.embedding_dimension == 0 {
            return Err(Error::InvalidConfig {
                reason: "embedding_dimension must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    /// Path of the serialized vector matrix artifact.
    pub fn vectors_path(&self) -> PathBuf {
        expand_path(&self.index_dir).join(&self.vectors_file)
    }

    /// Path of the serialized chunk sequence artifact.
    pub fn chunks_path(&self) -> PathBuf {
        expand_path(&self.index_dir).join(&self.chunks_file)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}
