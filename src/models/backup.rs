//! Versioned full-state backup document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format version written by this build.
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Top-level fields every importable document must carry.
pub const REQUIRED_FIELDS: [&str; 3] = ["timestamp", "version", "data"];

/// Summary of the slice map, computed at export time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackupMetadata {
    /// Record count per slice (list length or object key count).
    pub slice_counts: BTreeMap<String, usize>,
    /// Sum of all slice counts.
    pub total_records: usize,
    /// Serialized size of the slice map in bytes.
    pub byte_size: usize,
    /// SHA-256 hex digest of the serialized slice map.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// The whole persisted state as a single document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct BackupDocument {
    /// Export time.
    pub timestamp: DateTime<Utc>,
    /// Format version, `major.minor`.
    pub version: String,
    /// Slice key to slice contents.
    pub data: BTreeMap<String, serde_json::Value>,
    /// Counts and size summary.
    #[serde(default)]
    pub metadata: BackupMetadata,
}

/// One row of the bounded export history ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackupHistoryEntry {
    /// Export time.
    pub timestamp: DateTime<Utc>,
    /// Artifact file name.
    pub filename: String,
    /// Serialized slice map size.
    pub byte_size: usize,
    /// Records across all slices.
    pub total_records: usize,
}
