//! Feature Hashing Model
//!
//! Deterministic FNV-1a bag-of-words embeddings. No model files, no
//! runtime; useful as a fallback and in tests.

use async_trait::async_trait;
use std::sync::Arc;

use super::model::{EmbeddingModel, ModelLoader};
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Default output dimension of [`HashingModel`]
pub const DEFAULT_HASHING_DIMENSION: usize = 768;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hashes unigrams and adjacent-word bigrams into signed buckets.
#[derive(Debug, Clone)]
pub struct HashingModel {
    dimension: usize,
}

impl Default for HashingModel {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl HashingModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn add_feature(&self, out: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        out[bucket] += sign * weight;
    }

    /// Embed one text synchronously
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dimension];
        let tokens = Self::tokens(text);
        for token in &tokens {
            self.add_feature(&mut out, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut out, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        out
    }
}

#[async_trait]
impl EmbeddingModel for HashingModel {
    fn name(&self) -> &str {
        "fnv1a-hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Loader for [`HashingModel`]
#[derive(Debug, Clone, Default)]
pub struct HashingLoader {
    dimension: Option<usize>,
}

impl HashingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[async_trait]
impl ModelLoader for HashingLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let model = self
            .dimension
            .map(HashingModel::new)
            .unwrap_or_default();
        Ok(Arc::new(model))
    }
}
