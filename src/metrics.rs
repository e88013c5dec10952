//! Basic Metrics
//!
//! Operation counters and latency tracking for the store and the
//! embedding provider.

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Operations that modify persisted state
const WRITE_OPS: &[&str] = &[
    "put",
    "delete",
    "delete_by_bank",
    "clear_all",
    "save_bank",
    "delete_bank",
];

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Total operations count
    total_ops: AtomicU64,

    /// Failed operations count
    failed_ops: AtomicU64,

    /// Operations per operation name
    ops_by_name: RwLock<HashMap<String, u64>>,

    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            total_ops: AtomicU64::new(0),
            failed_ops: AtomicU64::new(0),
            ops_by_name: RwLock::new(HashMap::new()),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
        }
    }

    /// Record an operation
    pub fn record_operation(&self, op: &str, latency: Duration) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);

        {
            let mut ops = self.ops_by_name.write();
            *ops.entry(op.to_string()).or_insert(0) += 1;
        }

        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_min_us.fetch_min(latency_us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    /// Record a failed operation
    pub fn record_failure(&self, op: &str, latency: Duration) {
        self.failed_ops.fetch_add(1, Ordering::Relaxed);
        self.record_operation(op, latency);
    }

    /// Get total operations count
    pub fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }

    /// Get failed operations count
    pub fn failed_ops(&self) -> u64 {
        self.failed_ops.load(Ordering::Relaxed)
    }

    /// Count for a single operation name
    pub fn ops_for(&self, op: &str) -> u64 {
        self.ops_by_name.read().get(op).copied().unwrap_or(0)
    }

    /// Number of recorded operations that modify persisted state
    pub fn write_ops(&self) -> u64 {
        let ops = self.ops_by_name.read();
        WRITE_OPS.iter().filter_map(|op| ops.get(*op)).sum()
    }

    /// Get average latency in microseconds
    pub fn avg_latency_us(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        sum as f64 / count as f64
    }

    /// Get min latency in microseconds
    pub fn min_latency_us(&self) -> u64 {
        let min = self.latency_min_us.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    /// Get max latency in microseconds
    pub fn max_latency_us(&self) -> u64 {
        self.latency_max_us.load(Ordering::Relaxed)
    }

    /// Get a summary of metrics
    pub fn summary(&self) -> String {
        format!(
            "Operations: {} ({} failed) | Latency (µs): avg={:.1}, min={}, max={}",
            self.total_ops(),
            self.failed_ops(),
            self.avg_latency_us(),
            self.min_latency_us(),
            self.max_latency_us()
        )
    }
}
