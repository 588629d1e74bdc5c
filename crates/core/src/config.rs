//! Pipeline settings.
//!
//! Loaded with Figment from built-in defaults, then an optional TOML file,
//! then `DOCQA_*` environment variables (`DOCQA_CHUNK_SIZE=300`).

use crate::answer::DEFAULT_MAX_ANSWER_LENGTH;
use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::error::QaError;
use crate::gate::DEFAULT_RELEVANCE_THRESHOLD;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "DOCQA_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Maximum words per chunk.
    pub chunk_size: usize,
    /// Squared L2 cutoff for corpus search. Depends on the embedder's vector
    /// norms, so calibrate it per deployment.
    pub relevance_threshold: f32,
    pub max_answer_length: usize,
    pub top_k: usize,
    pub embedding_dimensions: usize,
    pub embed_timeout_ms: u64,
    pub extract_timeout_ms: u64,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            max_answer_length: DEFAULT_MAX_ANSWER_LENGTH,
            top_k: 1,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            embed_timeout_ms: 30_000,
            extract_timeout_ms: 30_000,
        }
    }
}

impl QaConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, QaError> {
        let mut figment = Figment::from(Serialized::defaults(QaConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(QaError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let config: QaConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), QaError> {
        if self.chunk_size == 0 {
            return Err(QaError::InvalidInput(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(QaError::InvalidInput(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.max_answer_length == 0 {
            return Err(QaError::InvalidInput(
                "max_answer_length must be greater than zero".to_string(),
            ));
        }
        if self.embedding_dimensions == 0 {
            return Err(QaError::InvalidInput(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if !self.relevance_threshold.is_finite() {
            return Err(QaError::InvalidInput(format!(
                "relevance_threshold must be finite, got {}",
                self.relevance_threshold
            )));
        }
        Ok(())
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }
}
