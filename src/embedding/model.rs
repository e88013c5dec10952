//! Embedding model seams.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// A loaded embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model identifier for logs
    fn name(&self) -> &str;

    /// Native output dimensionality
    fn dimension(&self) -> usize;

    /// Encode non-empty texts, one vector per input, in input order
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Loads a model. Loading is expensive and runs at most once per
/// successful initialization.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>>;
}

/// Per-call embedding options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    /// Scale output to unit L2 norm
    pub normalize: bool,
    /// Cut output to the configured output dimension
    pub truncate: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            truncate: true,
        }
    }
}

impl EmbedOptions {
    /// Raw model output
    pub fn raw() -> Self {
        Self {
            normalize: false,
            truncate: false,
        }
    }
}

/// What the synchronizer and the ranker need from an embedding provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed passages, preserving input order
    async fn embed_batch(&self, texts: &[String], options: EmbedOptions) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query
    async fn embed_query(&self, text: &str, options: EmbedOptions) -> Result<Vec<f32>>;
}
