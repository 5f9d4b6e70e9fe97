//! Unit tests for the `SQLite` slice repository.

use std::sync::Arc;
use std::time::Duration;

use checkup_sync::persistence::{db, PersistentStore, SliceRepo, SliceStorage};

async fn repo() -> SliceRepo {
    let pool = db::connect_memory().await.expect("in-memory db");
    SliceRepo::new(Arc::new(pool))
}

#[tokio::test]
async fn put_then_get_round_trips_document() {
    let repo = repo().await;
    repo.put("queue", "[]").await.expect("put");
    assert_eq!(repo.get("queue").await.expect("get").as_deref(), Some("[]"));
}

#[tokio::test]
async fn put_replaces_existing_document() {
    let repo = repo().await;
    repo.put("dashboard", r#"{"patients":1}"#).await.expect("put");
    repo.put("dashboard", r#"{"patients":2}"#).await.expect("put");

    assert_eq!(
        repo.get("dashboard").await.expect("get").as_deref(),
        Some(r#"{"patients":2}"#)
    );
    assert_eq!(repo.list_keys().await.expect("keys"), vec!["dashboard"]);
}

#[tokio::test]
async fn delete_reports_whether_row_existed() {
    let repo = repo().await;
    repo.put("families", "[]").await.expect("put");

    assert!(repo.delete("families").await.expect("delete"));
    assert!(!repo.delete("families").await.expect("delete again"));
    assert!(repo.get("families").await.expect("get").is_none());
}

#[tokio::test]
async fn list_keys_is_sorted() {
    let repo = repo().await;
    for key in ["queue", "analytics", "patients"] {
        repo.put(key, "[]").await.expect("put");
    }
    assert_eq!(
        repo.list_keys().await.expect("keys"),
        vec!["analytics", "patients", "queue"]
    );
}

#[tokio::test]
async fn store_flush_lands_in_database() {
    let repo = Arc::new(repo().await);
    let store = PersistentStore::new(
        Arc::clone(&repo) as Arc<dyn SliceStorage>,
        Duration::from_millis(300),
    );

    store.put("medical_records", &vec!["r1", "r2"]);
    store.flush().await;

    assert_eq!(
        repo.get("medical_records").await.expect("get").as_deref(),
        Some(r#"["r1","r2"]"#)
    );
}
