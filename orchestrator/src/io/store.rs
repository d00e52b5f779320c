//! Shared state store abstraction.
//!
//! The [`SharedStore`] trait decouples the orchestrator from the store's
//! transport. [`MemoryStore`] is the in-process implementation used by the
//! simulator and tests; it keeps an append-only write log so observers can
//! check what was written and when.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A committed write, as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub path: String,
    pub value: Value,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Value>>;

    async fn write(&self, path: &str, value: Value) -> Result<()>;

    /// Write `value` iff the current value equals `expected` (`None` = absent).
    async fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool>;

    /// Changes to `prefix` or anything beneath it.
    fn subscribe(&self, prefix: &str) -> StoreSubscription;
}

/// Filtered change feed returned by [`SharedStore::subscribe`].
pub struct StoreSubscription {
    prefix: String,
    rx: broadcast::Receiver<StoreChange>,
}

impl StoreSubscription {
    pub fn new(prefix: &str, rx: broadcast::Receiver<StoreChange>) -> Self {
        Self {
            prefix: prefix.to_string(),
            rx,
        }
    }

    /// Next matching change, or `None` once the store is gone.
    pub async fn next(&mut self) -> Option<StoreChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if path_matches(&self.prefix, &change.path) => return Some(change),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(prefix = %self.prefix, skipped, "store subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

fn path_matches(prefix: &str, path: &str) -> bool {
    path == prefix
        || prefix.is_empty()
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Entry in [`MemoryStore`]'s write log.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub path: String,
    pub value: Value,
    pub at: Instant,
}

#[derive(Default)]
struct MemoryInner {
    values: BTreeMap<String, Value>,
    log: Vec<WriteRecord>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            changes,
        }
    }

    /// Every committed write, oldest first.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().log.clone()
    }

    /// Committed writes to `prefix` or beneath it.
    pub fn writes_under(&self, prefix: &str) -> Vec<WriteRecord> {
        self.lock()
            .log
            .iter()
            .filter(|record| path_matches(prefix, &record.path))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.lock().values.clone()
    }

    /// Synchronous write, for seeding before any task runs.
    pub fn insert(&self, path: &str, value: Value) {
        self.commit(path, value);
    }

    fn commit(&self, path: &str, value: Value) {
        Self::record(&mut self.lock(), path, value.clone());
        self.notify(path, value);
    }

    fn record(inner: &mut MemoryInner, path: &str, value: Value) {
        inner.values.insert(path.to_string(), value.clone());
        inner.log.push(WriteRecord {
            path: path.to_string(),
            value,
            at: Instant::now(),
        });
    }

    fn notify(&self, path: &str, value: Value) {
        debug!(path, "store write");
        // No subscribers is fine.
        let _ = self.changes.send(StoreChange {
            path: path.to_string(),
            value,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.lock().values.get(path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        self.commit(path, value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool> {
        {
            let mut inner = self.lock();
            if inner.values.get(path) != expected {
                return Ok(false);
            }
            Self::record(&mut inner, path, value.clone());
        }
        self.notify(path, value);
        Ok(true)
    }

    fn subscribe(&self, prefix: &str) -> StoreSubscription {
        StoreSubscription::new(prefix, self.changes.subscribe())
    }
}
