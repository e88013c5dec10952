//! Bank Synchronizer
//!
//! Whole-bank invalidation: if the stored records of a bank differ from its
//! declared content in count or in any positional text, every record of the
//! bank is deleted and the full content is embedded and inserted again.
//! Runs on the same bank are serialized.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::embedding::{EmbedOptions, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::store::{MemoryStore, NamedBank, NewRecord, Record};

/// Result of one bank synchronization
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The store matches the content. Records are in content order.
    Ready {
        records: Vec<Record>,
        reembedded: bool,
    },
    /// A newer activation superseded this run before it finished
    Abandoned,
}

impl SyncOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, SyncOutcome::Ready { .. })
    }

    pub fn records(&self) -> Option<&[Record]> {
        match self {
            SyncOutcome::Ready { records, .. } => Some(records),
            SyncOutcome::Abandoned => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            SyncOutcome::Ready { records, .. } => Some(records),
            SyncOutcome::Abandoned => None,
        }
    }
}

/// Per-bank results of a multi-bank pass
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Banks whose cache was already current
    pub unchanged: Vec<String>,
    /// Banks that were re-embedded
    pub reembedded: Vec<String>,
    /// Banks that failed, with the error
    pub failed: Vec<(String, Error)>,
}

impl SyncSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// True if `existing` no longer matches `content`, by count or by the text
/// at any position.
pub fn is_stale(existing: &[Record], content: &[String]) -> bool {
    existing.len() != content.len()
        || existing
            .iter()
            .zip(content)
            .any(|(record, text)| record.text != *text)
}

/// Orchestrates the store and the embedding provider per bank.
pub struct BankSynchronizer {
    store: Arc<MemoryStore>,
    provider: Arc<dyn EmbeddingProvider>,
    generation: AtomicU64,
    active: Mutex<Option<String>>,
    bank_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BankSynchronizer {
    pub fn new(store: Arc<MemoryStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            provider,
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
            bank_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Generation of the most recent activation
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Name of the most recently activated bank
    pub fn active_bank(&self) -> Option<String> {
        self.active.lock().clone()
    }

    /// Make `bank` the active bank and return the generation its
    /// synchronization must run under.
    ///
    /// Any activation still in flight is superseded: it stops writing at its
    /// next suspension point and reports [`SyncOutcome::Abandoned`].
    pub fn begin_activation(&self, bank: &str) -> u64 {
        let mut active = self.active.lock();
        *active = Some(bank.to_string());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(bank, generation, "Activating bank");
        generation
    }

    /// Synchronize the bank of an activation started with
    /// [`begin_activation`](Self::begin_activation)
    pub async fn run_activation(
        &self,
        bank: &str,
        content: &[String],
        generation: u64,
    ) -> Result<SyncOutcome> {
        self.run(bank, content, Some(generation)).await
    }

    /// If `bank` is active, clear it and supersede its activation.
    /// Returns whether it was active.
    pub fn deactivate(&self, bank: &str) -> bool {
        let mut active = self.active.lock();
        if active.as_deref() != Some(bank) {
            return false;
        }
        *active = None;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(bank, generation, "Bank deactivated");
        true
    }

    /// Exclusive access to a bank's records.
    ///
    /// Synchronization holds this for a whole run. Callers removing a bank
    /// take it so no run interleaves with the removal.
    pub async fn lock_bank(&self, bank: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .bank_locks
            .lock()
            .entry(bank.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Synchronize a bank outside of activation. Never abandoned.
    pub async fn sync_bank(&self, bank: &str, content: &[String]) -> Result<SyncOutcome> {
        self.run(bank, content, None).await
    }

    /// Synchronize several banks one after another.
    ///
    /// A failing bank is logged and skipped; the pass always continues.
    pub async fn sync_all(&self, banks: &[NamedBank]) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for bank in banks {
            match self.sync_bank(&bank.name, &bank.content).await {
                Ok(SyncOutcome::Ready { reembedded: true, .. }) => {
                    summary.reembedded.push(bank.name.clone())
                }
                Ok(_) => summary.unchanged.push(bank.name.clone()),
                Err(e) => {
                    warn!(bank = %bank.name, error = %e, "Bank synchronization failed");
                    summary.failed.push((bank.name.clone(), e));
                }
            }
        }
        info!(
            unchanged = summary.unchanged.len(),
            reembedded = summary.reembedded.len(),
            failed = summary.failed.len(),
            "Synchronization pass finished"
        );
        summary
    }

    fn superseded(&self, generation: Option<u64>) -> bool {
        generation.is_some_and(|g| g != self.generation.load(Ordering::SeqCst))
    }

    async fn run(
        &self,
        bank: &str,
        content: &[String],
        generation: Option<u64>,
    ) -> Result<SyncOutcome> {
        let _bank = self.lock_bank(bank).await;
        if self.superseded(generation) {
            return Ok(abandoned(bank, "while waiting for the bank"));
        }

        let existing = self.store.get_by_bank(bank).await?;
        if self.superseded(generation) {
            return Ok(abandoned(bank, "after store read"));
        }

        if !is_stale(&existing, content) {
            debug!(bank, records = existing.len(), "Bank cache is current");
            return Ok(SyncOutcome::Ready {
                records: existing,
                reembedded: false,
            });
        }

        info!(
            bank,
            cached = existing.len(),
            entries = content.len(),
            "Bank cache is stale, re-embedding"
        );
        self.store.delete_by_bank(bank).await?;
        if self.superseded(generation) {
            return Ok(abandoned(bank, "after delete"));
        }

        let vectors = self
            .provider
            .embed_batch(content, EmbedOptions::default())
            .await?;
        if self.superseded(generation) {
            return Ok(abandoned(bank, "after embedding"));
        }
        if vectors.len() != content.len() {
            return Err(Error::Embedding(format!(
                "Provider returned {} vectors for {} entries",
                vectors.len(),
                content.len()
            )));
        }

        let mut records = Vec::with_capacity(content.len());
        for (seq, (text, embedding)) in content.iter().zip(vectors).enumerate() {
            if self.superseded(generation) {
                return Ok(abandoned(bank, "before insert"));
            }
            let record = NewRecord::new(bank, seq as u32, text.clone(), embedding);
            let id = self.store.put(record.clone()).await?;
            records.push(record.with_id(id));
        }

        info!(bank, records = records.len(), "Bank re-embedded");
        Ok(SyncOutcome::Ready {
            records,
            reembedded: true,
        })
    }
}

fn abandoned(bank: &str, at: &str) -> SyncOutcome {
    debug!(bank, at, "Synchronization superseded");
    SyncOutcome::Abandoned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingService;
    use crate::store::MemoryEngine;
    use crate::testing::{FlakyEngine, MockLoader, MockModel};

    struct Fixture {
        sync: Arc<BankSynchronizer>,
        store: Arc<MemoryStore>,
        loader: Arc<MockLoader>,
    }

    fn fixture_with(engine: Arc<dyn crate::store::StorageEngine>) -> Fixture {
        let store = Arc::new(MemoryStore::new(engine));
        let loader = Arc::new(MockLoader::new(MockModel::new(8)));
        let provider = Arc::new(EmbeddingService::with_defaults(loader.clone()));
        Fixture {
            sync: Arc::new(BankSynchronizer::new(store.clone(), provider)),
            store,
            loader,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryEngine::new()))
    }

    fn content(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn activate(
        sync: &BankSynchronizer,
        bank: &str,
        facts: &[String],
    ) -> Result<SyncOutcome> {
        let generation = sync.begin_activation(bank);
        sync.run_activation(bank, facts, generation).await
    }

    #[test]
    fn test_is_stale() {
        let record = |seq: u32, text: &str| Record {
            id: seq as u64 + 1,
            text: text.to_string(),
            embedding: vec![],
            bank: "b".into(),
            seq,
        };
        let existing = vec![record(0, "a"), record(1, "b")];
        assert!(!is_stale(&existing, &content(&["a", "b"])));
        assert!(is_stale(&existing, &content(&["b", "a"])));
        assert!(is_stale(&existing, &content(&["a"])));
        assert!(is_stale(&existing, &content(&["a", "b", "c"])));
        assert!(!is_stale(&[], &[]));
    }

    #[tokio::test]
    async fn test_first_sync_embeds_in_order() {
        let f = fixture();
        let facts = content(&["one", "two", "three"]);

        let outcome = f.sync.sync_bank("numbers", &facts).await.unwrap();
        let SyncOutcome::Ready { records, reembedded } = outcome else {
            panic!("expected ready");
        };
        assert!(reembedded);
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(records.iter().all(|r| r.dim() == 8));

        assert_eq!(f.loader.model().encode_calls(), 1);
        assert_eq!(f.store.get_by_bank("numbers").await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_unchanged_bank_performs_no_writes() {
        let f = fixture();
        let facts = content(&["alpha", "beta"]);
        f.sync.sync_bank("greek", &facts).await.unwrap();

        let writes = f.store.metrics().write_ops();
        let encodes = f.loader.model().encode_calls();

        let outcome = f.sync.sync_bank("greek", &facts).await.unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Ready {
                reembedded: false,
                ..
            }
        ));
        assert_eq!(f.store.metrics().write_ops(), writes);
        assert_eq!(f.loader.model().encode_calls(), encodes);
    }

    #[tokio::test]
    async fn test_single_change_reembeds_whole_bank() {
        let f = fixture();
        let mut facts = content(&["a", "b", "c", "d", "e"]);
        let first = f
            .sync
            .sync_bank("letters", &facts)
            .await
            .unwrap()
            .into_records()
            .unwrap();

        let puts = f.store.metrics().ops_for("put");
        facts[2] = "C".to_string();
        let second = f
            .sync
            .sync_bank("letters", &facts)
            .await
            .unwrap()
            .into_records()
            .unwrap();

        assert_eq!(f.store.metrics().ops_for("put") - puts, 5);
        assert_eq!(second.len(), 5);
        for old in &first {
            assert!(second.iter().all(|new| new.id != old.id));
        }
        let seen = f.loader.model().seen_texts();
        assert_eq!(&seen[5..], &facts[..]);
    }

    #[tokio::test]
    async fn test_reorder_is_stale() {
        let f = fixture();
        f.sync
            .sync_bank("b", &content(&["x", "y"]))
            .await
            .unwrap();
        let outcome = f
            .sync
            .sync_bank("b", &content(&["y", "x"]))
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Ready { reembedded: true, .. }));
        let texts: Vec<String> = f
            .store
            .get_by_bank("b")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, content(&["y", "x"]));
    }

    #[tokio::test]
    async fn test_superseded_activation_is_abandoned() {
        let f = fixture();
        let pause = f.loader.model().pause_next_encode();

        let sync = f.sync.clone();
        let first = tokio::spawn(async move {
            activate(&sync, "slow", &content(&["s1", "s2", "s3"])).await
        });

        pause.entered().await;
        let second = activate(&f.sync, "fast", &content(&["f1"])).await.unwrap();
        assert!(second.is_ready());

        pause.release();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, SyncOutcome::Abandoned);
        assert!(first.records().is_none());
        assert!(f.store.get_by_bank("slow").await.unwrap().is_empty());
        assert_eq!(f.store.get_by_bank("fast").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_activation_superseded_between_inserts() {
        let engine = Arc::new(FlakyEngine::new(MemoryEngine::new()));
        let f = fixture_with(engine.clone());
        f.store.ensure_open().await.unwrap();
        let hold = engine.hold_next("insert_record");

        let sync = f.sync.clone();
        let slow = tokio::spawn(async move {
            activate(&sync, "slow", &content(&["s1", "s2", "s3"])).await
        });

        // first record written, its insert call not yet returned
        hold.entered().await;
        assert_eq!(f.store.get_by_bank("slow").await.unwrap().len(), 1);

        let fast = activate(&f.sync, "fast", &content(&["f1"])).await.unwrap();
        assert!(fast.is_ready());
        hold.release();

        assert_eq!(slow.await.unwrap().unwrap(), SyncOutcome::Abandoned);
        let left = f.store.get_by_bank("slow").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].text, "s1");
        assert_eq!(f.sync.active_bank().as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn test_runs_on_one_bank_are_serialized() {
        let f = fixture();
        let facts = content(&["n1", "n2"]);
        let pause = f.loader.model().pause_next_encode();

        let sync = f.sync.clone();
        let activation = {
            let facts = facts.clone();
            tokio::spawn(async move { activate(&sync, "notes", &facts).await })
        };
        pause.entered().await;

        let sync = f.sync.clone();
        let reader = {
            let facts = facts.clone();
            tokio::spawn(async move { sync.sync_bank("notes", &facts).await })
        };
        tokio::task::yield_now().await;
        pause.release();

        let first = activation.await.unwrap().unwrap();
        let second = reader.await.unwrap().unwrap();
        assert!(matches!(first, SyncOutcome::Ready { reembedded: true, .. }));
        assert!(matches!(second, SyncOutcome::Ready { reembedded: false, .. }));
        assert_eq!(first.records(), second.records());

        assert_eq!(f.store.get_by_bank("notes").await.unwrap().len(), 2);
        assert_eq!(f.loader.model().encode_calls(), 1);
    }

    #[test]
    fn test_deactivate_only_clears_matching_bank() {
        let f = fixture();
        let generation = f.sync.begin_activation("a");

        assert!(!f.sync.deactivate("b"));
        assert_eq!(f.sync.current_generation(), generation);
        assert_eq!(f.sync.active_bank().as_deref(), Some("a"));

        assert!(f.sync.deactivate("a"));
        assert!(f.sync.current_generation() > generation);
        assert!(f.sync.active_bank().is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces_without_retry() {
        let f = fixture();
        f.loader.model().fail_next_encodes(1);
        let err = f
            .sync
            .sync_bank("b", &content(&["x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(f.loader.model().encode_calls(), 1);
        assert!(f.store.get_by_bank("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_continues_past_failures() {
        let engine = Arc::new(FlakyEngine::new(MemoryEngine::new()));
        let f = fixture_with(engine.clone());
        f.store.ensure_open().await.unwrap();

        engine.fail_next("records_by_index", 1);
        let banks = vec![
            NamedBank::new("broken", content(&["x"])),
            NamedBank::new("fine", content(&["y", "z"])),
        ];
        let summary = f.sync.sync_all(&banks).await;

        assert!(!summary.is_clean());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "broken");
        assert_eq!(summary.reembedded, vec!["fine".to_string()]);

        let again = f.sync.sync_all(&banks).await;
        assert!(again.is_clean());
        assert_eq!(again.unchanged, vec!["fine".to_string()]);
        assert_eq!(again.reembedded, vec!["broken".to_string()]);
    }
}
