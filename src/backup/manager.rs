//! Full-state export and import.
//!
//! Export gathers every slice into one [`BackupDocument`], writes it to the
//! backup directory and records it in a bounded history ledger. Import
//! validates the whole document and stages every slice before any
//! in-memory slice is replaced, so a rejected document changes nothing.
//! Accepted slices are then written one at a time; slices the document
//! does not mention are left as they are.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::models::backup::{
    BackupDocument, BackupHistoryEntry, BackupMetadata, BACKUP_FORMAT_VERSION, REQUIRED_FIELDS,
};
use crate::models::slice::SliceName;
use crate::sync::{SliceSet, WorkflowState};
use crate::{AppError, Result};

/// Store key of the export history ledger.
pub const HISTORY_KEY: &str = "backup.history";

/// Upper bound on ledger entries, whatever the configured limit.
pub const MAX_HISTORY: usize = 10;

/// A written backup document.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    /// The exported document.
    pub document: BackupDocument,
    /// Where it was written.
    pub path: PathBuf,
}

/// What an import replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Slices replaced, in write order.
    pub replaced: Vec<SliceName>,
    /// Keys in the document that name no known slice (ignored).
    pub ignored: Vec<String>,
    /// Records across the replaced slices.
    pub total_records: usize,
}

/// Exports and restores the aggregate of all slices.
pub struct BackupManager {
    state: Arc<WorkflowState>,
    dir: PathBuf,
    history_limit: usize,
    history: Mutex<Vec<BackupHistoryEntry>>,
}

impl BackupManager {
    /// Create a manager writing to `dir`, hydrating the history ledger.
    ///
    /// `history_limit` is clamped to `1..=10`.
    pub async fn load(state: Arc<WorkflowState>, dir: impl Into<PathBuf>, history_limit: usize) -> Self {
        let history = state.store().load(HISTORY_KEY, Vec::new()).await;
        Self {
            state,
            dir: dir.into(),
            history_limit: history_limit.clamp(1, MAX_HISTORY),
            history: Mutex::new(history),
        }
    }

    /// Export every slice to a new file in the backup directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if a slice cannot be serialized, or
    /// `AppError::Io` if the artifact cannot be written.
    pub async fn export(&self) -> Result<BackupArtifact> {
        let span = info_span!("backup_export");
        async move {
            let data = self.state.snapshot().await?;
            let metadata = summarize(&data)?;
            let timestamp = Utc::now();
            let document = BackupDocument {
                timestamp,
                version: BACKUP_FORMAT_VERSION.to_owned(),
                data,
                metadata,
            };

            let filename = format!(
                "checkup-backup-{}-{}.json",
                timestamp.format("%Y-%m-%d"),
                timestamp.timestamp_nanos_opt().unwrap_or_default()
            );
            let path = self.dir.join(&filename);
            let body = serde_json::to_vec_pretty(&document)?;

            tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", self.dir.display()))
            })?;
            tokio::fs::write(&path, &body)
                .await
                .map_err(|err| AppError::Io(format!("failed to write {}: {err}", path.display())))?;

            self.record_history(BackupHistoryEntry {
                timestamp,
                filename,
                byte_size: document.metadata.byte_size,
                total_records: document.metadata.total_records,
            })
            .await;

            info!(
                path = %path.display(),
                total_records = document.metadata.total_records,
                byte_size = document.metadata.byte_size,
                "backup exported"
            );
            Ok(BackupArtifact { document, path })
        }
        .instrument(span)
        .await
    }

    /// Replace slices from a backup document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if a required field is missing, the
    /// version is unsupported, the checksum does not match, or any slice is
    /// malformed. No slice is replaced in that case.
    pub async fn import(&self, raw: &Value) -> Result<ImportReport> {
        let span = info_span!("backup_import");
        async move {
            let document = validate(raw)?;
            let (set, ignored) = SliceSet::from_map(&document.data)?;
            if !ignored.is_empty() {
                warn!(?ignored, "backup carries unknown slices, ignoring them");
            }

            let replaced = set.names();
            let total_records = replaced
                .iter()
                .filter_map(|name| document.data.get(name.as_key()))
                .map(record_count)
                .sum();

            self.state.replace(set).await;

            info!(
                slices = replaced.len(),
                total_records,
                exported_at = %document.timestamp,
                "backup imported"
            );
            Ok(ImportReport {
                replaced,
                ignored,
                total_records,
            })
        }
        .instrument(span)
        .await
    }

    /// Read a backup artifact from disk and import it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be read, otherwise the
    /// errors of [`import`](Self::import).
    pub async fn import_file(&self, path: &Path) -> Result<ImportReport> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|err| AppError::Io(format!("failed to read {}: {err}", path.display())))?;
        let raw: Value = serde_json::from_slice(&body)?;
        self.import(&raw).await
    }

    /// Export history, oldest first.
    pub async fn history(&self) -> Vec<BackupHistoryEntry> {
        self.history.lock().await.clone()
    }

    /// Directory artifacts are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn record_history(&self, entry: BackupHistoryEntry) {
        let mut history = self.history.lock().await;
        history.push(entry);
        while history.len() > self.history_limit {
            history.remove(0);
        }
        self.state.store().put(HISTORY_KEY, &*history);
    }
}

/// Check the document envelope and decode it.
fn validate(raw: &Value) -> Result<BackupDocument> {
    let Some(fields) = raw.as_object() else {
        return Err(AppError::Validation(
            "invalid backup format: document is not an object".into(),
        ));
    };
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !fields.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "invalid backup format: missing {}",
            missing.join(", ")
        )));
    }

    let document: BackupDocument = serde_json::from_value(raw.clone())
        .map_err(|err| AppError::Validation(format!("invalid backup format: {err}")))?;

    let major = document.version.split('.').next().unwrap_or_default();
    let supported = BACKUP_FORMAT_VERSION.split('.').next().unwrap_or_default();
    if major != supported {
        return Err(AppError::Validation(format!(
            "unsupported backup version {}",
            document.version
        )));
    }

    if let Some(expected) = &document.metadata.checksum {
        let actual = sha256_hex(&serde_json::to_vec(&document.data)?);
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(AppError::Validation(
                "backup checksum mismatch, document was altered".into(),
            ));
        }
    }

    Ok(document)
}

fn summarize(data: &BTreeMap<String, Value>) -> Result<BackupMetadata> {
    let serialized = serde_json::to_vec(data)?;
    let slice_counts: BTreeMap<String, usize> = data
        .iter()
        .map(|(key, value)| (key.clone(), record_count(value)))
        .collect();
    Ok(BackupMetadata {
        total_records: slice_counts.values().sum(),
        slice_counts,
        byte_size: serialized.len(),
        checksum: Some(sha256_hex(&serialized)),
    })
}

/// List length for array slices, key count for object slices.
fn record_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(fields) => fields.len(),
        _ => 0,
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
