//! In-memory storage double shared by the unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use checkup_sync::persistence::{PersistentStore, SliceStorage};
use checkup_sync::{AppError, Result};

/// Records every durable write; can be switched to fail.
#[derive(Default)]
pub struct MemoryStorage {
    docs: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn seeded(docs: &[(&str, &str)]) -> Self {
        let storage = Self::default();
        {
            let mut map = storage.docs.lock().unwrap();
            for (key, value) in docs {
                map.insert((*key).to_owned(), (*value).to_owned());
            }
        }
        storage
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_for(&self, key: &str) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn doc(&self, key: &str) -> Option<String> {
        self.docs.lock().unwrap().get(key).cloned()
    }
}

impl SliceStorage for MemoryStorage {
    fn read(&self, key: String) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        Box::pin(async move { Ok(self.doc(&key)) })
    }

    fn write(
        &self,
        key: String,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Storage("quota exceeded".into()));
            }
            self.writes
                .lock()
                .unwrap()
                .push((key.clone(), value.clone()));
            self.docs.lock().unwrap().insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.docs.lock().unwrap().remove(&key);
            Ok(())
        })
    }
}

pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Store over a fresh [`MemoryStorage`] with the default debounce window.
pub fn memory_store() -> (Arc<MemoryStorage>, Arc<PersistentStore>) {
    let storage = Arc::new(MemoryStorage::default());
    let store = Arc::new(PersistentStore::new(
        Arc::clone(&storage) as Arc<dyn SliceStorage>,
        DEBOUNCE,
    ));
    (storage, store)
}
