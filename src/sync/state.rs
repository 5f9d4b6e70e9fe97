//! In-memory aggregate of every persisted slice.
//!
//! [`WorkflowState`] owns the working copy of each slice. Every mutation
//! goes through it so the changed slices are handed to the
//! [`PersistentStore`] right after the in-memory update. Each slice is
//! saved as its own document; no write spans two slices.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::checkup::CheckupSession;
use crate::models::queue::QueueEntry;
use crate::models::slice::SliceName;
use crate::persistence::PersistentStore;
use crate::{AppError, Result};

/// Working copy of all slices.
///
/// The three workflow slices are typed; the remaining CRUD slices are
/// carried as opaque JSON documents.
#[derive(Debug, Clone, Default)]
pub struct Slices {
    /// Clinician queue.
    pub queue: Vec<QueueEntry>,
    /// Today's checkups (active slice).
    pub todays_checkups: Vec<CheckupSession>,
    /// Clinician checkup history (historical slice).
    pub doctor_checkups: Vec<CheckupSession>,
    /// Every other slice, keyed by name.
    pub other: BTreeMap<SliceName, Value>,
}

/// A validated, possibly partial, set of slice replacements.
#[derive(Debug, Clone, Default)]
pub struct SliceSet {
    /// Replacement queue.
    pub queue: Option<Vec<QueueEntry>>,
    /// Replacement today's checkups.
    pub todays_checkups: Option<Vec<CheckupSession>>,
    /// Replacement checkup history.
    pub doctor_checkups: Option<Vec<CheckupSession>>,
    /// Replacement opaque slices.
    pub other: BTreeMap<SliceName, Value>,
}

impl SliceSet {
    /// Type-check a slice map (slice key → document).
    ///
    /// Unknown keys are returned separately rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if any known slice has the wrong shape.
    pub fn from_map(map: &BTreeMap<String, Value>) -> Result<(Self, Vec<String>)> {
        let mut set = Self::default();
        let mut unknown = Vec::new();

        for (key, value) in map {
            let Some(name) = SliceName::from_key(key) else {
                unknown.push(key.clone());
                continue;
            };
            match name {
                SliceName::Queue => set.queue = Some(typed(name, value)?),
                SliceName::TodaysCheckups => set.todays_checkups = Some(typed(name, value)?),
                SliceName::DoctorCheckups => set.doctor_checkups = Some(typed(name, value)?),
                other => {
                    let shape_ok = if other.is_object() {
                        value.is_object()
                    } else {
                        value.is_array()
                    };
                    if !shape_ok {
                        return Err(AppError::Validation(format!(
                            "slice {other} has the wrong shape"
                        )));
                    }
                    set.other.insert(other, value.clone());
                }
            }
        }

        Ok((set, unknown))
    }

    /// Names of the slices this set replaces.
    #[must_use]
    pub fn names(&self) -> Vec<SliceName> {
        let mut names = Vec::new();
        if self.queue.is_some() {
            names.push(SliceName::Queue);
        }
        if self.todays_checkups.is_some() {
            names.push(SliceName::TodaysCheckups);
        }
        if self.doctor_checkups.is_some() {
            names.push(SliceName::DoctorCheckups);
        }
        names.extend(self.other.keys().copied());
        names
    }
}

fn typed<T: serde::de::DeserializeOwned>(name: SliceName, value: &Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|err| AppError::Validation(format!("slice {name} is malformed: {err}")))
}

fn empty_document(name: SliceName) -> Value {
    if name.is_object() {
        Value::Object(serde_json::Map::new())
    } else {
        Value::Array(Vec::new())
    }
}

/// Shared, persisted working state for one surface.
pub struct WorkflowState {
    slices: RwLock<Slices>,
    store: Arc<PersistentStore>,
}

impl WorkflowState {
    /// Start with every slice empty.
    #[must_use]
    pub fn empty(store: Arc<PersistentStore>) -> Self {
        let other = SliceName::ALL
            .into_iter()
            .filter(|name| !is_workflow_slice(*name))
            .map(|name| (name, empty_document(name)))
            .collect();
        Self {
            slices: RwLock::new(Slices {
                other,
                ..Slices::default()
            }),
            store,
        }
    }

    /// Hydrate every slice from the store, defaulting missing ones to empty.
    pub async fn load(store: Arc<PersistentStore>) -> Self {
        let queue = store.load(SliceName::Queue.as_key(), Vec::new()).await;
        let todays_checkups = store
            .load(SliceName::TodaysCheckups.as_key(), Vec::new())
            .await;
        let doctor_checkups = store
            .load(SliceName::DoctorCheckups.as_key(), Vec::new())
            .await;

        let mut other = BTreeMap::new();
        for name in SliceName::ALL {
            if is_workflow_slice(name) {
                continue;
            }
            let value = store.load(name.as_key(), empty_document(name)).await;
            other.insert(name, value);
        }

        let slices = Slices {
            queue,
            todays_checkups,
            doctor_checkups,
            other,
        };
        info!(
            queue = slices.queue.len(),
            todays_checkups = slices.todays_checkups.len(),
            doctor_checkups = slices.doctor_checkups.len(),
            "workflow state hydrated"
        );

        Self {
            slices: RwLock::new(slices),
            store,
        }
    }

    /// Snapshot of the clinician queue.
    pub async fn queue(&self) -> Vec<QueueEntry> {
        self.slices.read().await.queue.clone()
    }

    /// Snapshot of today's checkups.
    pub async fn todays_checkups(&self) -> Vec<CheckupSession> {
        self.slices.read().await.todays_checkups.clone()
    }

    /// Snapshot of the clinician checkup history.
    pub async fn doctor_checkups(&self) -> Vec<CheckupSession> {
        self.slices.read().await.doctor_checkups.clone()
    }

    /// Snapshot of every slice.
    pub async fn slices(&self) -> Slices {
        self.slices.read().await.clone()
    }

    /// Every slice rendered as a JSON document, keyed by slice key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if a typed slice cannot be serialized.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, Value>> {
        let slices = self.slices.read().await;
        let mut map = BTreeMap::new();
        map.insert(
            SliceName::Queue.as_key().to_owned(),
            serde_json::to_value(&slices.queue)?,
        );
        map.insert(
            SliceName::TodaysCheckups.as_key().to_owned(),
            serde_json::to_value(&slices.todays_checkups)?,
        );
        map.insert(
            SliceName::DoctorCheckups.as_key().to_owned(),
            serde_json::to_value(&slices.doctor_checkups)?,
        );
        for (name, value) in &slices.other {
            map.insert(name.as_key().to_owned(), value.clone());
        }
        Ok(map)
    }

    /// Mutate the queue and persist it.
    pub async fn update_queue<R>(&self, f: impl FnOnce(&mut Vec<QueueEntry>) -> R) -> R {
        let mut slices = self.slices.write().await;
        let result = f(&mut slices.queue);
        self.store.put(SliceName::Queue.as_key(), &slices.queue);
        result
    }

    /// Mutate today's checkups and persist them.
    pub async fn update_todays_checkups<R>(
        &self,
        f: impl FnOnce(&mut Vec<CheckupSession>) -> R,
    ) -> R {
        let mut slices = self.slices.write().await;
        let result = f(&mut slices.todays_checkups);
        self.store
            .put(SliceName::TodaysCheckups.as_key(), &slices.todays_checkups);
        result
    }

    /// Mutate the workflow slices together; persist them only on success.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error, in which case nothing is persisted.
    /// The closure must not leave partial changes behind when it fails.
    pub async fn try_update<R>(&self, f: impl FnOnce(&mut Slices) -> Result<R>) -> Result<R> {
        let mut slices = self.slices.write().await;
        let result = f(&mut slices)?;
        self.persist_workflow(&slices);
        Ok(result)
    }

    /// Replace the queue with an authoritative snapshot if `still_current` holds.
    ///
    /// The check runs under the write lock so a superseded response can
    /// never overwrite a newer one. Returns whether the snapshot was applied.
    pub async fn replace_queue_if(
        &self,
        entries: Vec<QueueEntry>,
        still_current: impl FnOnce() -> bool,
    ) -> bool {
        let mut slices = self.slices.write().await;
        if !still_current() {
            return false;
        }
        slices.queue = entries;
        self.store.put(SliceName::Queue.as_key(), &slices.queue);
        true
    }

    /// Replace today's checkups with an authoritative snapshot if `still_current` holds.
    pub async fn replace_todays_checkups_if(
        &self,
        records: Vec<CheckupSession>,
        still_current: impl FnOnce() -> bool,
    ) -> bool {
        let mut slices = self.slices.write().await;
        if !still_current() {
            return false;
        }
        slices.todays_checkups = records;
        self.store
            .put(SliceName::TodaysCheckups.as_key(), &slices.todays_checkups);
        true
    }

    /// Replace each slice present in `set`, one slice at a time.
    pub async fn replace(&self, set: SliceSet) {
        let names = set.names();
        let SliceSet {
            queue,
            todays_checkups,
            doctor_checkups,
            other,
        } = set;

        if let Some(queue) = queue {
            self.update_queue(|current| *current = queue).await;
        }
        if let Some(records) = todays_checkups {
            self.update_todays_checkups(|current| *current = records)
                .await;
        }
        if let Some(records) = doctor_checkups {
            let mut slices = self.slices.write().await;
            slices.doctor_checkups = records;
            self.store
                .put(SliceName::DoctorCheckups.as_key(), &slices.doctor_checkups);
        }
        for (name, value) in other {
            let mut slices = self.slices.write().await;
            self.store.put(name.as_key(), &value);
            slices.other.insert(name, value);
        }

        debug!(?names, "slices replaced");
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    fn persist_workflow(&self, slices: &Slices) {
        self.store.put(SliceName::Queue.as_key(), &slices.queue);
        self.store
            .put(SliceName::TodaysCheckups.as_key(), &slices.todays_checkups);
        self.store
            .put(SliceName::DoctorCheckups.as_key(), &slices.doctor_checkups);
    }
}

fn is_workflow_slice(name: SliceName) -> bool {
    matches!(
        name,
        SliceName::Queue | SliceName::TodaysCheckups | SliceName::DoctorCheckups
    )
}
