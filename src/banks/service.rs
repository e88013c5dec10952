//! Bank Service
//!
//! Entry point for the UI layer: bank catalog, activation, search and
//! neighbor graphs over one store and one embedding provider.

use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::builtin::{builtin, BUILTIN_BANKS};
use super::custom::parse_custom_bank;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, EmbeddingService, ModelLoader};
use crate::error::{Error, Result};
use crate::search::{RankedFact, SearchRanker};
use crate::store::{MemoryEngine, MemoryStore, NamedBank, Record, StorageEngine};
use crate::sync::{BankSynchronizer, SyncOutcome, SyncSummary};
use crate::vector::{build_neighbor_graph, GraphParams, NeighborGraph};

/// Where a bank's content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankKind {
    BuiltIn,
    Custom,
}

impl fmt::Display for BankKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankKind::BuiltIn => write!(f, "built-in"),
            BankKind::Custom => write!(f, "custom"),
        }
    }
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankInfo {
    pub name: String,
    pub kind: BankKind,
    pub entries: usize,
}

/// Graph snapshot of one bank; node `i` is `texts[i]`
#[derive(Debug, Clone, PartialEq)]
pub struct BankGraph {
    pub texts: Vec<String>,
    pub graph: NeighborGraph,
}

pub struct BankService {
    store: Arc<MemoryStore>,
    synchronizer: BankSynchronizer,
    ranker: SearchRanker,
    graph: GraphParams,
}

impl BankService {
    pub fn new(
        store: Arc<MemoryStore>,
        provider: Arc<dyn EmbeddingProvider>,
        graph: GraphParams,
    ) -> Self {
        Self {
            synchronizer: BankSynchronizer::new(store.clone(), provider.clone()),
            ranker: SearchRanker::new(provider),
            store,
            graph,
        }
    }

    /// Wire a service from configuration
    pub fn from_config(config: &Config, loader: Arc<dyn ModelLoader>) -> Self {
        let engine: Arc<dyn StorageEngine> = match &config.snapshot_path {
            Some(path) => Arc::new(MemoryEngine::with_snapshot(path.clone())),
            None => Arc::new(MemoryEngine::new()),
        };
        let store = Arc::new(MemoryStore::new(engine));
        let provider = Arc::new(EmbeddingService::new(loader, config.embedding.clone()));
        Self::new(store, provider, config.graph)
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn synchronizer(&self) -> &BankSynchronizer {
        &self.synchronizer
    }

    /// Name of the most recently activated bank
    pub fn active_bank(&self) -> Option<String> {
        self.synchronizer.active_bank()
    }

    /// Built-in banks first, then custom banks by name
    pub async fn list_banks(&self) -> Result<Vec<BankInfo>> {
        let mut banks: Vec<BankInfo> = BUILTIN_BANKS
            .iter()
            .map(|b| BankInfo {
                name: b.name.to_string(),
                kind: BankKind::BuiltIn,
                entries: b.content.len(),
            })
            .collect();

        for name in self.store.list_bank_names().await? {
            if let Some(bank) = self.store.get_bank(&name).await? {
                banks.push(BankInfo {
                    name: bank.name,
                    kind: BankKind::Custom,
                    entries: bank.content.len(),
                });
            }
        }
        Ok(banks)
    }

    /// Declared content of a built-in or custom bank
    pub async fn bank_content(&self, name: &str) -> Result<NamedBank> {
        if let Some(bank) = builtin(name) {
            return Ok(bank.to_named());
        }
        self.store
            .get_bank(name)
            .await?
            .ok_or_else(|| Error::InvalidBank(format!("Unknown bank '{}'", name)))
    }

    /// Validate, save and embed a new custom bank.
    ///
    /// Validation happens before any embedding call. Saving an existing
    /// custom name replaces its content.
    pub async fn create_custom_bank(&self, name: &str, raw: &str) -> Result<Vec<Record>> {
        let bank = parse_custom_bank(name, raw)?;
        self.store.save_bank(bank.clone()).await?;
        info!(bank = %bank.name, entries = bank.len(), "Custom bank saved");

        let outcome = self.synchronizer.sync_bank(&bank.name, &bank.content).await?;
        Ok(outcome.into_records().unwrap_or_default())
    }

    /// Remove a custom bank and all of its records.
    ///
    /// An activation of the bank still in flight is abandoned, and no
    /// synchronization of the bank runs while it is removed.
    pub async fn delete_custom_bank(&self, name: &str) -> Result<usize> {
        if builtin(name).is_some() {
            return Err(Error::InvalidBank(format!(
                "'{}' is a built-in bank and cannot be deleted",
                name
            )));
        }
        if self.store.get_bank(name).await?.is_none() {
            return Err(Error::InvalidBank(format!("Unknown bank '{}'", name)));
        }

        self.synchronizer.deactivate(name);
        let _bank = self.synchronizer.lock_bank(name).await;
        self.store.delete_bank(name).await?;
        let removed = self.store.delete_by_bank(name).await?;

        info!(bank = name, records = removed, "Custom bank deleted");
        Ok(removed)
    }

    /// Switch the active bank, superseding any activation in flight
    pub async fn activate(&self, name: &str) -> Result<SyncOutcome> {
        // unknown banks leave the current activation alone
        self.bank_content(name).await?;
        let generation = self.synchronizer.begin_activation(name);

        // read again under the new generation: a deletion that finished in
        // between is reported here, one that starts later cancels the run
        let bank = match self.bank_content(name).await {
            Ok(bank) => bank,
            Err(e) => {
                self.synchronizer.deactivate(name);
                return Err(e);
            }
        };
        self.synchronizer
            .run_activation(&bank.name, &bank.content, generation)
            .await
    }

    /// Up-to-date records of a bank, in content order
    pub async fn records(&self, name: &str) -> Result<Vec<Record>> {
        let bank = self.bank_content(name).await?;
        let outcome = self.synchronizer.sync_bank(&bank.name, &bank.content).await?;
        Ok(outcome.into_records().unwrap_or_default())
    }

    /// Rank a bank's facts against a text query
    pub async fn search(&self, name: &str, query: &str) -> Result<Vec<RankedFact>> {
        let records = self.records(name).await?;
        self.ranker.search(query, &records).await
    }

    /// Neighbor graph over a bank's facts
    pub async fn neighbor_graph(&self, name: &str) -> Result<BankGraph> {
        let records = self.records(name).await?;
        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.embedding.clone()).collect();
        Ok(BankGraph {
            graph: build_neighbor_graph(&vectors, self.graph),
            texts: records.into_iter().map(|r| r.text).collect(),
        })
    }

    /// Synchronize every built-in and custom bank, one at a time
    pub async fn warm_up(&self) -> Result<SyncSummary> {
        let mut banks: Vec<NamedBank> = BUILTIN_BANKS.iter().map(|b| b.to_named()).collect();
        for name in self.store.list_bank_names().await? {
            if let Some(bank) = self.store.get_bank(&name).await? {
                banks.push(bank);
            }
        }
        Ok(self.synchronizer.sync_all(&banks).await)
    }
}
