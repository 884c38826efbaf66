//! Persistent record of which file versions have been loaded
//!
//! The ledger answers one question: has this exact `(category, file, fingerprint)`
//! triple been committed before? New loads are staged in memory with
//! [`Ledger::record`] and written out by [`Ledger::commit`], which re-reads the
//! store, merges, compacts and atomically replaces it.

mod csv_store;

pub use csv_store::{CsvLedgerStore, LEDGER_HEADER};

use chrono::{DateTime, Utc};
use dropzone_common::types::LedgerKey;
use dropzone_common::{Category, LedgerEntry};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, MutexGuard};
use tracing::{debug, info};

use crate::error::Result;

/// Durable backing for a [`Ledger`]
pub trait LedgerStore: Send + Sync {
    /// All persisted entries; empty when nothing has been persisted yet
    fn read_all(&self) -> Result<Vec<LedgerEntry>>;

    /// Atomically replace the persisted contents
    fn replace_all(&self, entries: &[LedgerEntry]) -> Result<()>;

    /// Serializes read-merge-write cycles against this store
    fn commit_guard(&self) -> MutexGuard<'_, ()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

type Index = HashMap<Category, HashMap<String, HashSet<String>>>;

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    entries: Vec<LedgerEntry>,
    staged: Vec<LedgerEntry>,
    index: Index,
}

impl Ledger {
    /// Read the persisted ledger; fails only if it exists and is unreadable
    pub fn load(store: Arc<dyn LedgerStore>) -> Result<Self> {
        let entries = store.read_all()?;
        debug!(ledger = %store.describe(), entries = entries.len(), "Loaded ledger");

        let mut ledger = Self {
            store,
            entries: Vec::new(),
            staged: Vec::new(),
            index: Index::new(),
        };
        ledger.reset(entries);
        Ok(ledger)
    }

    /// Whether the triple is persisted or staged
    pub fn is_loaded(&self, category: Category, file_id: &str, fingerprint: &str) -> bool {
        self.index
            .get(&category)
            .and_then(|files| files.get(file_id))
            .is_some_and(|digests| digests.contains(fingerprint))
    }

    /// Stage a successful load; not durable until [`Ledger::commit`]
    pub fn record(
        &mut self,
        category: Category,
        file_id: impl Into<String>,
        fingerprint: impl Into<String>,
        loaded_at: DateTime<Utc>,
    ) {
        let entry = LedgerEntry::new(category, file_id, fingerprint, loaded_at);
        insert_key(&mut self.index, &entry);
        self.staged.push(entry);
    }

    /// Persist staged entries merged with whatever is currently stored.
    ///
    /// Returns the number of entries now persisted. Does not touch the store
    /// when nothing is staged. On failure staged entries are kept so a later
    /// commit can retry.
    pub fn commit(&mut self) -> Result<usize> {
        if self.staged.is_empty() {
            debug!(ledger = %self.store.describe(), "Nothing staged, ledger left untouched");
            return Ok(self.entries.len());
        }

        let merged = {
            let _guard = self.store.commit_guard();
            let persisted = self.store.read_all()?;
            let merged = compact(
                persisted
                    .into_iter()
                    .chain(self.entries.iter().cloned())
                    .chain(self.staged.iter().cloned()),
            );
            self.store.replace_all(&merged)?;
            merged
        };

        info!(
            ledger = %self.store.describe(),
            staged = self.staged.len(),
            entries = merged.len(),
            "Committed ledger"
        );
        self.staged.clear();
        self.reset(merged);
        Ok(self.entries.len())
    }

    /// Persisted entries followed by staged ones
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().chain(self.staged.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    fn reset(&mut self, entries: Vec<LedgerEntry>) {
        let mut index = Index::new();
        for entry in entries.iter().chain(self.staged.iter()) {
            insert_key(&mut index, entry);
        }
        self.index = index;
        self.entries = entries;
    }
}

fn insert_key(index: &mut Index, entry: &LedgerEntry) {
    index
        .entry(entry.category)
        .or_default()
        .entry(entry.file_id.clone())
        .or_default()
        .insert(entry.fingerprint.clone());
}

/// Keep one entry per key: the latest `loaded_at`, with ties going to the
/// later entry. Output order follows each key's first appearance.
pub fn compact(entries: impl IntoIterator<Item = LedgerEntry>) -> Vec<LedgerEntry> {
    let mut order: Vec<LedgerKey> = Vec::new();
    let mut latest: HashMap<LedgerKey, LedgerEntry> = HashMap::new();

    for entry in entries {
        let key = entry.key();
        match latest.get_mut(&key) {
            Some(existing) => {
                if entry.loaded_at >= existing.loaded_at {
                    *existing = entry;
                }
            },
            None => {
                order.push(key.clone());
                latest.insert(key, entry);
            },
        }
    }

    order.into_iter().filter_map(|key| latest.remove(&key)).collect()
}
