//! Configuration

use std::path::PathBuf;

use crate::embedding::EmbeddingConfig;
use crate::vector::GraphParams;

/// factbank configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Snapshot file for the store (None = in-memory only)
    pub snapshot_path: Option<PathBuf>,

    /// Embedding output settings
    pub embedding: EmbeddingConfig,

    /// Neighbor graph settings
    pub graph: GraphParams,
}

impl Config {
    /// Persist the store to a snapshot file
    pub fn with_snapshot_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Dimension kept when embeddings are truncated
    pub fn with_output_dimension(mut self, dim: usize) -> Self {
        self.embedding.output_dimension = dim;
        self
    }

    /// Instruction wrapped around search queries
    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.embedding.query_template = template.into();
        self
    }

    /// Neighbors kept per graph node
    pub fn with_neighbors(mut self, k: usize) -> Self {
        self.graph.k = k;
        self
    }

    /// Minimum similarity for a graph edge
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.graph.threshold = threshold;
        self
    }
}
