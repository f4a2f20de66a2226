//! Outcome history
//!
//! Append-only log of observed outcomes, deduplicated by external id and
//! mirrored to a durable backend after every successful append.

mod json_file;
mod sqlite;

pub use json_file::JsonFileHistory;
pub use sqlite::SqliteHistory;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::{StoreBackendKind, StoreConfig};
use crate::models::Outcome;

/// Durable mirror of the outcome history.
pub trait HistoryBackend: Send + Sync {
    fn load(&self) -> Result<Vec<Outcome>>;

    /// Persist a single append. `history` already ends with the new outcome.
    fn record_append(&self, history: &[Outcome]) -> Result<()>;

    /// Replace the stored history with `history` in one atomic step.
    fn save_all(&self, history: &[Outcome]) -> Result<()>;

    fn describe(&self) -> String;
}

/// Non-durable backend for replays and tests
#[derive(Default)]
pub struct MemoryHistory {
    saved: Mutex<Vec<Outcome>>,
}

impl HistoryBackend for MemoryHistory {
    fn load(&self) -> Result<Vec<Outcome>> {
        Ok(self.saved.lock().clone())
    }

    fn record_append(&self, history: &[Outcome]) -> Result<()> {
        if let Some(last) = history.last() {
            self.saved.lock().push(last.clone());
        }
        Ok(())
    }

    fn save_all(&self, history: &[Outcome]) -> Result<()> {
        *self.saved.lock() = history.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

pub fn open_backend(config: &StoreConfig) -> Result<Box<dyn HistoryBackend>> {
    Ok(match config.backend {
        StoreBackendKind::Sqlite => Box::new(SqliteHistory::new(&config.path)?),
        StoreBackendKind::Json => Box::new(JsonFileHistory::new(&config.path)),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    Appended(u64),
    Duplicate,
}

pub struct OutcomeStore {
    outcomes: Vec<Outcome>,
    ids: HashSet<String>,
    backend: Box<dyn HistoryBackend>,
    /// Set when a durable write failed; the next write rewrites everything
    dirty: bool,
}

impl OutcomeStore {
    /// Open a store on top of `backend`, loading whatever it already holds.
    pub fn open(backend: Box<dyn HistoryBackend>) -> Result<Self> {
        let saved = backend
            .load()
            .with_context(|| format!("Failed to load history from {}", backend.describe()))?;

        let mut store = Self {
            outcomes: Vec::with_capacity(saved.len()),
            ids: HashSet::with_capacity(saved.len()),
            backend,
            dirty: false,
        };

        for outcome in saved {
            if !store.ids.insert(outcome.external_id.clone()) {
                warn!(id = %outcome.external_id, "duplicate id in saved history, skipping");
                store.dirty = true;
                continue;
            }
            let expected = store.outcomes.len() as u64;
            if outcome.sequence_index != expected {
                store.dirty = true;
            }
            store.outcomes.push(Outcome {
                sequence_index: expected,
                ..outcome
            });
        }

        info!(
            backend = %store.backend.describe(),
            outcomes = store.outcomes.len(),
            "📚 Outcome history loaded"
        );
        Ok(store)
    }

    pub fn in_memory() -> Self {
        Self {
            outcomes: Vec::new(),
            ids: HashSet::new(),
            backend: Box::new(MemoryHistory::default()),
            dirty: false,
        }
    }

    /// Append a validated value. A known id is a silent no-op.
    pub fn append(&mut self, value: u32, external_id: &str) -> AppendResult {
        if self.ids.contains(external_id) {
            debug!(id = external_id, "outcome already stored");
            return AppendResult::Duplicate;
        }

        let sequence_index = self.outcomes.len() as u64;
        self.ids.insert(external_id.to_string());
        self.outcomes.push(Outcome {
            value,
            external_id: external_id.to_string(),
            sequence_index,
            received_at: Utc::now(),
        });

        let written = if self.dirty {
            self.backend.save_all(&self.outcomes)
        } else {
            self.backend.record_append(&self.outcomes)
        };
        match written {
            Ok(()) => self.dirty = false,
            Err(e) => {
                warn!(error = %e, sequence_index, "failed to persist outcome, will retry");
                self.dirty = true;
            }
        }

        AppendResult::Appended(sequence_index)
    }

    /// Rewrite the whole history if an earlier write failed.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.backend
            .save_all(&self.outcomes)
            .with_context(|| format!("Failed to flush history to {}", self.backend.describe()))?;
        self.dirty = false;
        info!(outcomes = self.outcomes.len(), "💾 History flushed");
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The full ordered history. The iterator is cheap to clone and restart.
    pub fn all(&self) -> std::slice::Iter<'_, Outcome> {
        self.outcomes.iter()
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn tail(&self, n: usize) -> &[Outcome] {
        let start = self.outcomes.len().saturating_sub(n);
        &self.outcomes[start..]
    }

    pub fn last(&self) -> Option<&Outcome> {
        self.outcomes.last()
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.ids.contains(external_id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_duplicate_id_is_noop() {
        let mut store = OutcomeStore::in_memory();
        assert_eq!(store.append(7, "a"), AppendResult::Appended(0));
        assert_eq!(store.append(9, "b"), AppendResult::Appended(1));
        let before: Vec<Outcome> = store.all().cloned().collect();

        assert_eq!(store.append(30, "a"), AppendResult::Duplicate);
        assert_eq!(store.len(), 2);
        assert_eq!(store.outcomes(), before.as_slice());
    }

    #[test]
    fn test_tail_and_restartable_iteration() {
        let mut store = OutcomeStore::in_memory();
        for i in 0..5u32 {
            store.append(i, &format!("id-{i}"));
        }

        let tail: Vec<u32> = store.tail(3).iter().map(|o| o.value).collect();
        assert_eq!(tail, vec![2, 3, 4]);
        assert_eq!(store.tail(50).len(), 5);

        let iter = store.all();
        let first: u32 = iter.clone().map(|o| o.value).sum();
        let second: u32 = iter.map(|o| o.value).sum();
        assert_eq!(first, second);
    }

    /// Backend that can be switched into a failing state
    struct FlakyBackend {
        failing: Arc<AtomicBool>,
        inner: MemoryHistory,
    }

    impl HistoryBackend for FlakyBackend {
        fn load(&self) -> Result<Vec<Outcome>> {
            self.inner.load()
        }

        fn record_append(&self, history: &[Outcome]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.inner.record_append(history)
        }

        fn save_all(&self, history: &[Outcome]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.inner.save_all(history)
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[test]
    fn test_persistence_failure_keeps_memory_and_retries() {
        let failing = Arc::new(AtomicBool::new(true));
        let backend = FlakyBackend {
            failing: failing.clone(),
            inner: MemoryHistory::default(),
        };
        let mut store = OutcomeStore::open(Box::new(backend)).unwrap();

        store.append(5, "x");
        assert_eq!(store.len(), 1);
        assert!(store.is_dirty());
        assert!(store.flush().is_err());

        failing.store(false, Ordering::SeqCst);
        store.flush().unwrap();
        assert!(!store.is_dirty());
    }
}
