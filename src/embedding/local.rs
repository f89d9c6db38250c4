//! In-process embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached;
//! afterwards embedding runs offline. Inference is blocking, so it runs on
//! tokio's blocking pool.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::http::ServiceError;

const DEFAULT_LOCAL_MODEL: &str = "bge-small-en-v1.5";

pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    kind: fastembed::EmbeddingModel,
    // Loaded lazily on the first embed call.
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let (kind, default_dims) = resolve_model(&model_name)?;

        Ok(Self {
            model_name,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
            kind,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((fastembed::EmbeddingModel::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((fastembed::EmbeddingModel::NomicEmbedTextV15, 768)),
        "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-base",
            other
        ),
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let slot = Arc::clone(&self.model);
        let kind = self.kind.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| ServiceError::Model("embedding model lock poisoned".to_string()))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(kind).with_show_download_progress(true),
                )
                .map_err(|e| ServiceError::Model(format!("failed to load model: {}", e)))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| ServiceError::Model("embedding model not loaded".to_string()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| ServiceError::Model(e.to_string()))
        })
        .await
        .map_err(|e| ServiceError::Model(e.to_string()))?
    }
}
