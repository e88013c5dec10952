//! Scripted embedding model for testing.

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::embedding::{EmbeddingModel, ModelLoader};
use crate::error::{Error, Result};

/// Handle for holding one `encode` call in flight.
#[derive(Clone, Default)]
pub struct Pause {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Pause {
    /// Wait until the paused call has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the paused call finish
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Called from inside the paused call
    pub(crate) async fn hold(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// A mock embedding model.
///
/// Features:
/// - Scripted vectors per text, dense deterministic vectors otherwise
/// - Counts calls and captures every text it was asked to encode
/// - Fails the next N calls on demand
/// - Holds the next call until released
pub struct MockModel {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    encode_calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    failures: AtomicUsize,
    pause: Mutex<Option<Pause>>,
}

impl MockModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
            encode_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            pause: Mutex::new(None),
        }
    }

    /// Return `vector` whenever `text` is encoded
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Number of `encode` calls so far
    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    /// Every text passed to `encode`, in call order
    pub fn seen_texts(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn fail_next_encodes(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Hold the next `encode` call until the returned handle is released
    pub fn pause_next_encode(&self) -> Pause {
        let pause = Pause::default();
        *self.pause.lock() = Some(pause.clone());
        pause
    }

    fn fallback(&self, text: &str) -> Vec<f32> {
        let seed = text
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3));
        (0..self.dimension)
            .map(|i| 1.0 + (seed.rotate_left((i % 64) as u32) & 0xff) as f32 / 255.0)
            .collect()
    }
}

#[async_trait]
impl EmbeddingModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().extend(texts.iter().cloned());

        let pause = self.pause.lock().take();
        if let Some(pause) = pause {
            pause.hold().await;
        }

        if take_one(&self.failures) {
            return Err(Error::Embedding("injected encode failure".into()));
        }

        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| self.fallback(t))
            })
            .collect())
    }
}

/// Loader handing out a shared [`MockModel`]
pub struct MockLoader {
    model: Arc<MockModel>,
    loads: AtomicUsize,
    failures: AtomicUsize,
    delay: Option<Duration>,
}

impl MockLoader {
    pub fn new(model: MockModel) -> Self {
        Self {
            model: Arc::new(model),
            loads: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Fail the first `n` loads
    pub fn fail_loads(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Simulated load latency
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn model(&self) -> &Arc<MockModel> {
        &self.model
    }

    /// Number of load attempts so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for MockLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.failures) {
            return Err(Error::ProviderInit("injected load failure".into()));
        }
        Ok(self.model.clone())
    }
}
