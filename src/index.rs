//! In-memory embedding index with content-keyed memoization.
//!
//! [`EmbeddingIndex`] pairs every chunk with its vector and answers top-k
//! queries by brute-force cosine similarity. It is built once from a batch
//! of chunks and never mutated afterwards.
//!
//! [`IndexCache`] remembers every index it has built, keyed by the ordered
//! chunk hashes plus the embedding model name, so processing the same
//! documents again reuses the existing index without calling the
//! embedding provider.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::embedding::{self, cosine_similarity, EmbeddingProvider};
use crate::http::ServiceError;
use crate::models::Chunk;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding request failed: {0}")]
    Embedding(#[from] ServiceError),
    #[error("embedding provider returned {got} vectors for {expected} chunks")]
    CountMismatch { expected: usize, got: usize },
    #[error("embedding dimensionality changed from {expected} to {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

pub struct EmbeddingIndex {
    entries: Vec<IndexedChunk>,
    model: String,
    dims: usize,
}

impl EmbeddingIndex {
    /// Embed `chunks` in batches of `batch_size` and build the index.
    pub async fn build(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = provider.embed(&texts).await?;
            if batch_vectors.len() != texts.len() {
                return Err(IndexError::CountMismatch {
                    expected: texts.len(),
                    got: batch_vectors.len(),
                });
            }
            vectors.extend(batch_vectors);
        }

        let dims = vectors.first().map_or(0, Vec::len);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                got: bad.len(),
            });
        }
        if dims != provider.dims() && !vectors.is_empty() {
            tracing::debug!(
                expected = provider.dims(),
                actual = dims,
                "Embedding dimensionality differs from provider default"
            );
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();

        Ok(Self {
            entries,
            model: provider.model_name().to_string(),
            dims,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Top-`k` chunks by cosine similarity to `query`, best first. Ties
    /// keep chunk order.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Vec<SearchHit<'_>> {
        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .map(|e| SearchHit {
                chunk: &e.chunk,
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        hits.truncate(k);
        hits
    }

    /// Embed `query` with `provider` and return the top-`k` chunks.
    pub async fn search(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit<'_>>, ServiceError> {
        let vector = embedding::embed_query(provider, query).await?;
        Ok(self.search_vector(&vector, k))
    }
}

/// Whether [`IndexCache::get_or_build`] reused an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Built,
}

/// Memoizes index construction by chunk content for the process lifetime.
#[derive(Default)]
pub struct IndexCache {
    entries: HashMap<String, Arc<EmbeddingIndex>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached index for this chunk set, or build and cache it.
    pub async fn get_or_build(
        &mut self,
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<(Arc<EmbeddingIndex>, CacheStatus), IndexError> {
        let key = cache_key(&chunks, provider.model_name());
        if let Some(index) = self.entries.get(&key) {
            tracing::info!(chunks = index.len(), "Reusing cached index");
            return Ok((Arc::clone(index), CacheStatus::Hit));
        }

        let index = Arc::new(EmbeddingIndex::build(chunks, provider, batch_size).await?);
        tracing::info!(
            chunks = index.len(),
            model = index.model_name(),
            dims = index.dims(),
            "Built index"
        );
        self.entries.insert(key, Arc::clone(&index));
        Ok((index, CacheStatus::Built))
    }
}

/// SHA-256 over the model name and the ordered chunk hashes.
fn cache_key(chunks: &[Chunk], model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    for chunk in chunks {
        hasher.update(chunk.hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
