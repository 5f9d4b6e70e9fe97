//! Write-coalescing snapshot store over a [`SliceStorage`] backend.
//!
//! [`PersistentStore::put`] serializes the value immediately but defers the
//! durable write by a debounce window. A second `put` to the same key inside
//! the window cancels the pending timer and reschedules it with the newer
//! value, so a burst of updates lands as a single write of the final value.
//! Keys are coalesced independently of each other.
//!
//! Write failures are logged and counted, never returned: the caller keeps
//! working from its in-memory copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, info, warn, Instrument};

use super::SliceStorage;

/// A serialized value waiting for its debounce window to elapse.
struct PendingWrite {
    value: String,
    generation: u64,
    timer: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingWrite>>>;

/// Debounced key/value snapshot persistence.
pub struct PersistentStore {
    storage: Arc<dyn SliceStorage>,
    debounce: Duration,
    pending: PendingMap,
    /// Serializes durable writes so `flush` observes every in-progress write.
    write_lock: Arc<tokio::sync::Mutex<()>>,
    generation: AtomicU64,
    failed_writes: Arc<AtomicU64>,
}

impl PersistentStore {
    /// Wrap a storage backend with the given coalescing window.
    #[must_use]
    pub fn new(storage: Arc<dyn SliceStorage>, debounce: Duration) -> Self {
        Self {
            storage,
            debounce,
            pending: Arc::default(),
            write_lock: Arc::default(),
            generation: AtomicU64::new(0),
            failed_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read the value stored under `key`, falling back to `default`.
    ///
    /// Intended for start-up hydration; callers keep their own in-memory
    /// copy afterwards. A value still waiting in the debounce window is
    /// returned in preference to the durable one. Unreadable or malformed
    /// documents are logged and replaced by `default`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.pending_value(key) {
            Some(value) => Some(value),
            None => match self.storage.read(key.to_owned()).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(key, %err, "slice read failed, using default");
                    return default;
                }
            },
        };

        match raw {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(key, %err, "stored slice is malformed, using default");
                default
            }),
            None => default,
        }
    }

    /// Schedule a coalesced write of `value` under `key`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(key, %err, "slice could not be serialized, write skipped");
                return;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = self.spawn_timer(key.to_owned(), generation);

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.insert(
            key.to_owned(),
            PendingWrite {
                value: serialized,
                generation,
                timer,
            },
        ) {
            previous.timer.abort();
            debug!(key, "pending write superseded");
        }
    }

    /// Cancel any pending write for `key` and delete its durable document.
    pub async fn remove(&self, key: &str) {
        let _guard = self.write_lock.lock().await;
        if let Some(previous) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
        {
            previous.timer.abort();
        }

        if let Err(err) = self.storage.remove(key.to_owned()).await {
            warn!(key, %err, "slice delete failed");
        }
    }

    /// Write every pending value now, bypassing the debounce window.
    ///
    /// Returns once all pending and in-progress writes have completed.
    pub async fn flush(&self) {
        let _guard = self.write_lock.lock().await;
        let drained: Vec<(String, PendingWrite)> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        for (key, write) in drained {
            write.timer.abort();
            write_logged(self.storage.as_ref(), &self.failed_writes, key, write.value).await;
        }
        info!(count, "flushed pending slice writes");
    }

    /// Keys with a write still waiting for its debounce window.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of durable writes that failed since start.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::SeqCst)
    }

    /// Configured coalescing window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn pending_value(&self, key: &str) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|write| write.value.clone())
    }

    fn spawn_timer(&self, key: String, generation: u64) -> JoinHandle<()> {
        let storage = Arc::clone(&self.storage);
        let pending = Arc::clone(&self.pending);
        let write_lock = Arc::clone(&self.write_lock);
        let failed_writes = Arc::clone(&self.failed_writes);
        let debounce = self.debounce;
        let span = debug_span!("coalesced_write", key = %key);

        tokio::spawn(
            async move {
                tokio::time::sleep(debounce).await;
                let _guard = write_lock.lock().await;

                // A newer put or a flush may have claimed the value already.
                let value = {
                    let mut map = pending.lock().unwrap_or_else(PoisonError::into_inner);
                    match map.get(&key) {
                        Some(write) if write.generation == generation => {
                            map.remove(&key).map(|write| write.value)
                        }
                        _ => None,
                    }
                };

                if let Some(value) = value {
                    write_logged(storage.as_ref(), &failed_writes, key, value).await;
                }
            }
            .instrument(span),
        )
    }
}

async fn write_logged(
    storage: &dyn SliceStorage,
    failed_writes: &AtomicU64,
    key: String,
    value: String,
) {
    let bytes = value.len();
    match storage.write(key.clone(), value).await {
        Ok(()) => debug!(key, bytes, "slice written"),
        Err(err) => {
            failed_writes.fetch_add(1, Ordering::SeqCst);
            warn!(key, bytes, %err, "slice write failed, continuing with in-memory state");
        }
    }
}
