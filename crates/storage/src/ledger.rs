use std::collections::VecDeque;

use common::models::LedgerEntry;
use tokio::sync::RwLock;
use tracing::debug;

pub const LEDGER_CAPACITY: usize = 50;

/// Bounded, in-memory history of confirmed trades. Oldest entries are
/// evicted first; reads return chronological copies.
pub struct TradeLedger {
    capacity: usize,
    entries: RwLock<VecDeque<LedgerEntry>>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::with_capacity(LEDGER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn append(&self, entry: LedgerEntry) {
        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        debug!("Ledger append: {} {}", entry.action, entry.symbol);
        entries.push_back(entry);
    }

    /// Last `n` entries, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<LedgerEntry> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new()
    }
}
