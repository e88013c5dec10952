//! Embedding Module
//!
//! Text to vector conversion behind a lazily loaded model.

mod hashing;
mod model;
mod service;

pub use hashing::{HashingLoader, HashingModel, DEFAULT_HASHING_DIMENSION};
pub use model::{EmbedOptions, EmbeddingModel, EmbeddingProvider, ModelLoader};
pub use service::{
    EmbeddingConfig, EmbeddingService, DEFAULT_OUTPUT_DIMENSION, DEFAULT_QUERY_TEMPLATE,
};
