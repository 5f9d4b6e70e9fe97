//! Unit tests for the write-coalescing slice store.
//!
//! Validates debounce collapsing, per-key independence, explicit flush,
//! removal, hydration fallbacks, and that storage failures are absorbed.

use std::sync::Arc;
use std::time::Duration;

use checkup_sync::persistence::{PersistentStore, SliceStorage};

use super::support::{memory_store, MemoryStorage, DEBOUNCE};

#[tokio::test(start_paused = true)]
async fn rapid_puts_to_one_key_collapse_into_final_write() {
    let (storage, store) = memory_store();

    for n in 1..=5 {
        store.put("queue", &vec![n]);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(storage.writes().is_empty(), "nothing written inside the window");

    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(storage.writes_for("queue"), vec!["[5]".to_owned()]);
    assert!(store.pending_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn keys_are_coalesced_independently() {
    let (storage, store) = memory_store();

    store.put("queue", &"a1");
    store.put("patients", &"b1");
    store.put("queue", &"a2");

    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(storage.writes_for("queue"), vec!["\"a2\"".to_owned()]);
    assert_eq!(storage.writes_for("patients"), vec!["\"b1\"".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn put_after_window_produces_second_write() {
    let (storage, store) = memory_store();

    store.put("queue", &1);
    tokio::time::sleep(DEBOUNCE * 2).await;
    store.put("queue", &2);
    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(
        storage.writes_for("queue"),
        vec!["1".to_owned(), "2".to_owned()]
    );
}

#[tokio::test(start_paused = true)]
async fn flush_writes_pending_values_immediately() {
    let (storage, store) = memory_store();

    store.put("queue", &"pending");
    store.put("families", &"also pending");
    assert_eq!(store.pending_keys(), vec!["families", "queue"]);

    store.flush().await;

    assert_eq!(storage.doc("queue").as_deref(), Some("\"pending\""));
    assert_eq!(storage.doc("families").as_deref(), Some("\"also pending\""));
    assert!(store.pending_keys().is_empty());

    // The aborted timers must not write again.
    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(storage.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn remove_cancels_pending_write_and_deletes() {
    let storage = Arc::new(MemoryStorage::seeded(&[("auth.session", "{}")]));
    let store = PersistentStore::new(Arc::clone(&storage) as Arc<dyn SliceStorage>, DEBOUNCE);

    store.put("auth.session", &"newer");
    store.remove("auth.session").await;
    tokio::time::sleep(DEBOUNCE * 2).await;

    assert!(storage.doc("auth.session").is_none());
    assert!(storage.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_write_is_counted_not_propagated() {
    let (storage, store) = memory_store();
    storage.fail_writes(true);

    store.put("inventory", &vec!["gauze"]);
    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(store.failed_writes(), 1);
    assert!(storage.doc("inventory").is_none());

    storage.fail_writes(false);
    store.put("inventory", &vec!["gauze"]);
    store.flush().await;
    assert_eq!(store.failed_writes(), 1);
    assert!(storage.doc("inventory").is_some());
}

#[tokio::test]
async fn load_prefers_pending_value_over_durable_one() {
    let storage = Arc::new(MemoryStorage::seeded(&[("queue", "[1]")]));
    let store = PersistentStore::new(Arc::clone(&storage) as Arc<dyn SliceStorage>, DEBOUNCE);

    let durable: Vec<u32> = store.load("queue", Vec::new()).await;
    assert_eq!(durable, vec![1]);

    store.put("queue", &vec![1, 2]);
    let pending: Vec<u32> = store.load("queue", Vec::new()).await;
    assert_eq!(pending, vec![1, 2]);
}

#[tokio::test]
async fn malformed_or_missing_document_falls_back_to_default() {
    let storage = Arc::new(MemoryStorage::seeded(&[("patients", "{not json")]));
    let store = PersistentStore::new(Arc::clone(&storage) as Arc<dyn SliceStorage>, DEBOUNCE);

    let malformed: Vec<String> = store.load("patients", vec!["fallback".to_owned()]).await;
    assert_eq!(malformed, vec!["fallback"]);

    let missing: Vec<String> = store.load("families", Vec::new()).await;
    assert!(missing.is_empty());
}
