//! Slice document repository for `SQLite` persistence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;

use crate::Result;

use super::db::Database;
use super::SliceStorage;

/// One row per storage key; each upsert replaces a whole document.
#[derive(Clone)]
pub struct SliceRepo {
    db: Arc<Database>,
}

impl SliceRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM slice WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.db.as_ref())
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Insert or replace the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO slice (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Delete the document stored under `key`. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM slice WHERE key = ?1")
            .bind(key)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List every stored key in lexical order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM slice ORDER BY key")
            .fetch_all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

impl SliceStorage for SliceRepo {
    fn read(&self, key: String) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        Box::pin(async move { self.get(&key).await })
    }

    fn write(
        &self,
        key: String,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.put(&key, &value).await })
    }

    fn remove(&self, key: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.delete(&key).await.map(|_| ()) })
    }
}
