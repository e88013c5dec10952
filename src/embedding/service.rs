//! Embedding Service
//!
//! Lazily loads one model and applies the output contract the rest of the
//! crate relies on: empty input and NaN output become zero vectors,
//! truncation fixes the output dimension, normalization yields unit norm.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::model::{EmbedOptions, EmbeddingModel, EmbeddingProvider, ModelLoader};
use crate::error::{Error, Result};
use crate::lazy::LazyHandle;
use crate::metrics::Metrics;
use crate::vector::normalize_vector;

/// Output dimension applied when truncation is enabled
pub const DEFAULT_OUTPUT_DIMENSION: usize = 256;

/// Instruction wrapped around search queries. `{text}` is replaced by the query.
pub const DEFAULT_QUERY_TEMPLATE: &str =
    "Represent this sentence for searching relevant passages: {text}";

/// Embedding service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Dimension kept when truncation is enabled
    pub output_dimension: usize,
    /// Query instruction template
    pub query_template: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            output_dimension: DEFAULT_OUTPUT_DIMENSION,
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn with_output_dimension(mut self, dim: usize) -> Self {
        self.output_dimension = dim;
        self
    }

    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = template.into();
        self
    }

    /// Wrap a query with the retrieval instruction
    pub fn render_query(&self, text: &str) -> String {
        if self.query_template.contains("{text}") {
            self.query_template.replace("{text}", text)
        } else {
            format!("{}{}", self.query_template, text)
        }
    }
}

/// Embedding provider backed by a lazily loaded model
pub struct EmbeddingService {
    loader: Arc<dyn ModelLoader>,
    model: LazyHandle<dyn EmbeddingModel>,
    config: EmbeddingConfig,
    metrics: Arc<Metrics>,
}

impl EmbeddingService {
    pub fn new(loader: Arc<dyn ModelLoader>, config: EmbeddingConfig) -> Self {
        Self {
            loader,
            model: LazyHandle::new(),
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(loader: Arc<dyn ModelLoader>) -> Self {
        Self::new(loader, EmbeddingConfig::default())
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Check if the model is loaded
    pub fn is_ready(&self) -> bool {
        self.model.is_ready()
    }

    /// Load the model once. Concurrent callers share the same load; a
    /// failed load is retried by the next call.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let loader = self.loader.clone();
        self.model
            .get_or_init(move || async move {
                let start = Instant::now();
                let model = loader.load().await.map_err(|e| match e {
                    Error::ProviderInit(_) => e,
                    other => Error::ProviderInit(other.to_string()),
                })?;
                info!(
                    model = model.name(),
                    dimension = model.dimension(),
                    elapsed = ?start.elapsed(),
                    "Embedding model loaded"
                );
                Ok(model)
            })
            .await
            .inspect_err(|e| {
                warn!(
                    error = %e,
                    attempts = self.model.attempts(),
                    "Embedding model failed to load"
                )
            })
    }

    /// Embed one passage
    pub async fn embed(&self, text: &str, options: EmbedOptions) -> Result<Vec<f32>> {
        let mut out = self.embed_texts(&[text.to_string()], options).await?;
        out.pop()
            .ok_or_else(|| Error::Embedding("Model returned no vector".into()))
    }

    async fn embed_texts(&self, texts: &[String], options: EmbedOptions) -> Result<Vec<Vec<f32>>> {
        let model = self.ensure_ready().await?;
        let native = model.dimension();

        let pending: Vec<String> = texts.iter().filter(|t| !t.is_empty()).cloned().collect();

        let mut encoded = if pending.is_empty() {
            Vec::new()
        } else {
            let start = Instant::now();
            let result = model.encode(&pending).await.map_err(|e| match e {
                Error::Embedding(_) => e,
                other => Error::Embedding(other.to_string()),
            });
            match &result {
                Ok(_) => self.metrics.record_operation("embed", start.elapsed()),
                Err(_) => self.metrics.record_failure("embed", start.elapsed()),
            }
            let vectors = result?;
            if vectors.len() != pending.len() {
                return Err(Error::Embedding(format!(
                    "Model returned {} vectors for {} texts",
                    vectors.len(),
                    pending.len()
                )));
            }
            vectors
        }
        .into_iter();

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            if text.is_empty() {
                out.push(vec![0.0; native]);
                continue;
            }
            let vector = encoded
                .next()
                .ok_or_else(|| Error::Embedding("Model returned too few vectors".into()))?;
            if vector.iter().any(|x| x.is_nan()) {
                warn!(model = model.name(), "Embedding contained NaN, using zero vector");
                out.push(vec![0.0; native]);
                continue;
            }
            out.push(self.finish(vector, options));
        }

        debug!(texts = texts.len(), "Embedded batch");
        Ok(out)
    }

    fn finish(&self, mut vector: Vec<f32>, options: EmbedOptions) -> Vec<f32> {
        if options.truncate {
            vector.truncate(self.config.output_dimension);
        }
        if options.normalize {
            normalize_vector(&mut vector);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed_batch(&self, texts: &[String], options: EmbedOptions) -> Result<Vec<Vec<f32>>> {
        self.embed_texts(texts, options).await
    }

    async fn embed_query(&self, text: &str, options: EmbedOptions) -> Result<Vec<f32>> {
        let wrapped = self.config.render_query(text);
        self.embed(&wrapped, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingLoader;
    use crate::testing::{MockLoader, MockModel};
    use crate::vector::magnitude;

    fn service(model: MockModel) -> (EmbeddingService, Arc<MockLoader>) {
        let loader = Arc::new(MockLoader::new(model));
        (EmbeddingService::with_defaults(loader.clone()), loader)
    }

    #[tokio::test]
    async fn test_empty_text_yields_native_zero_vector() {
        let (svc, loader) = service(MockModel::new(768));
        let v = svc.embed("", EmbedOptions::default()).await.unwrap();
        assert_eq!(v.len(), 768);
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(loader.model().encode_calls(), 0);
    }

    #[tokio::test]
    async fn test_truncate_and_normalize() {
        let (svc, _) = service(MockModel::new(768));
        let v = svc.embed("a fact", EmbedOptions::default()).await.unwrap();
        assert_eq!(v.len(), DEFAULT_OUTPUT_DIMENSION);
        assert!((magnitude(&v) - 1.0).abs() < 1e-5);

        let raw = svc.embed("a fact", EmbedOptions::raw()).await.unwrap();
        assert_eq!(raw.len(), 768);
    }

    #[tokio::test]
    async fn test_nan_output_becomes_zero_vector() {
        let model = MockModel::new(8).with_vector("broken", vec![f32::NAN; 8]);
        let (svc, _) = service(model);
        let v = svc.embed("broken", EmbedOptions::default()).await.unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_with_empty_entries() {
        let model = MockModel::new(4)
            .with_vector("x", vec![1.0, 0.0, 0.0, 0.0])
            .with_vector("y", vec![0.0, 2.0, 0.0, 0.0]);
        let (svc, loader) = service(model);

        let texts = vec!["y".to_string(), String::new(), "x".to_string()];
        let out = svc.embed_batch(&texts, EmbedOptions::default()).await.unwrap();

        assert_eq!(out[0], vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(out[1], vec![0.0; 4]);
        assert_eq!(out[2], vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(loader.model().encode_calls(), 1);
    }

    #[tokio::test]
    async fn test_query_is_wrapped_with_template() {
        let (svc, loader) = service(MockModel::new(4));
        svc.embed_query("moons", EmbedOptions::default()).await.unwrap();
        let seen = loader.model().seen_texts();
        assert_eq!(
            seen,
            vec!["Represent this sentence for searching relevant passages: moons".to_string()]
        );
    }

    #[tokio::test]
    async fn test_init_failure_is_retried() {
        let model = MockModel::new(4);
        let loader = Arc::new(MockLoader::new(model).fail_loads(1));
        let svc = EmbeddingService::with_defaults(loader.clone());

        let err = svc.ensure_ready().await.err().unwrap();
        assert!(matches!(err, Error::ProviderInit(_)));
        assert!(!svc.is_ready());

        svc.embed("ok", EmbedOptions::default()).await.unwrap();
        assert!(svc.is_ready());
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_load() {
        let loader = Arc::new(
            MockLoader::new(MockModel::new(4))
                .with_load_delay(std::time::Duration::from_millis(20)),
        );
        let svc = Arc::new(EmbeddingService::with_defaults(loader.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    svc.embed(&format!("text {}", i), EmbedOptions::default()).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_encode_failure_surfaces() {
        let (svc, loader) = service(MockModel::new(4));
        loader.model().fail_next_encodes(1);
        let err = svc.embed("x", EmbedOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(svc.metrics().failed_ops(), 1);

        // no automatic retry, but the next call works
        svc.embed("x", EmbedOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_hashing_loader_end_to_end() {
        let svc = EmbeddingService::with_defaults(Arc::new(HashingLoader::new()));
        let v = svc.embed("Saturn has rings", EmbedOptions::default()).await.unwrap();
        assert_eq!(v.len(), DEFAULT_OUTPUT_DIMENSION);
        assert!((magnitude(&v) - 1.0).abs() < 1e-5);
    }
}
