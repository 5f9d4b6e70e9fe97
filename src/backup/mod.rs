//! Backup export and restore of the persisted slices.

pub mod manager;

pub use manager::{BackupArtifact, BackupManager, ImportReport, HISTORY_KEY, MAX_HISTORY};
