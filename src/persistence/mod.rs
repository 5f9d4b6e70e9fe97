//! Persistence layer modules.

pub mod db;
pub mod schema;
pub mod slice_repo;
pub mod store;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

pub use slice_repo::SliceRepo;
pub use store::PersistentStore;

/// Durable key/value backend behind [`PersistentStore`].
///
/// Each key holds one self-contained document. A `write` must replace the
/// whole document atomically so a reader never observes a partial value.
pub trait SliceStorage: Send + Sync {
    /// Read the document stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn read(&self, key: String) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>>;

    /// Replace the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn write(&self, key: String, value: String)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Delete the document stored under `key`; deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    fn remove(&self, key: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
