//! Clinician queue entry: the queue-facing projection of a checkup session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checkup::{
    CheckupId, CheckupPatch, CheckupSession, CheckupSource, CheckupStatus, PatientSnapshot,
    Priority, Surface, VitalSigns,
};

/// One patient waiting for, or with, the clinician.
///
/// Shares the id space of [`CheckupSession`]; the queue never holds two
/// entries with the same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct QueueEntry {
    /// Checkup identifier.
    pub id: CheckupId,
    /// Patient record identifier.
    pub patient_id: String,
    /// Patient display name.
    pub patient_name: String,
    /// Age in years.
    #[serde(default)]
    pub age: Option<u32>,
    /// Gender as recorded at intake.
    #[serde(default)]
    pub gender: Option<String>,
    /// Contact detail.
    #[serde(default)]
    pub contact: Option<String>,
    /// Requested service.
    pub service_type: String,
    /// Triage priority.
    #[serde(default)]
    pub priority: Priority,
    /// Current workflow status.
    pub status: CheckupStatus,
    /// Latest vital signs.
    #[serde(default)]
    pub vital_signs: Option<VitalSigns>,
    /// Clinician notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// First time the entry entered the queue.
    pub queued_at: DateTime<Utc>,
    /// Last write timestamp.
    pub last_updated: DateTime<Utc>,
    /// Surface that performed the last write.
    #[serde(default)]
    pub last_updated_by: Option<Surface>,
    /// Originating workflow.
    #[serde(default)]
    pub source: CheckupSource,
}

impl QueueEntry {
    /// Project a session into a queue entry.
    #[must_use]
    pub fn from_session(session: &CheckupSession) -> Self {
        Self {
            id: session.id.clone(),
            patient_id: session.patient_id.clone(),
            patient_name: session.patient.name.clone(),
            age: session.patient.age,
            gender: session.patient.gender.clone(),
            contact: session.patient.contact.clone(),
            service_type: session.service_type.clone(),
            priority: session.priority,
            status: session.status,
            vital_signs: session.vital_signs.clone(),
            notes: session.notes.clone(),
            queued_at: session.queued_at.unwrap_or(session.last_updated),
            last_updated: session.last_updated,
            last_updated_by: session.last_updated_by,
            source: session.source,
        }
    }

    /// Expand the entry back into a session carrying the queue-visible fields.
    #[must_use]
    pub fn to_session(&self) -> CheckupSession {
        let patient = PatientSnapshot {
            name: self.patient_name.clone(),
            age: self.age,
            gender: self.gender.clone(),
            contact: self.contact.clone(),
        };
        let mut session = CheckupSession::new(
            self.id.clone(),
            self.patient_id.clone(),
            patient,
            self.service_type.clone(),
            self.priority,
        );
        session.status = self.status;
        session.vital_signs.clone_from(&self.vital_signs);
        session.notes.clone_from(&self.notes);
        session.queued_at = Some(self.queued_at);
        session.last_updated = self.last_updated;
        session.last_updated_by = self.last_updated_by;
        session.source = self.source;
        session
    }

    /// Overwrite this entry in place with a newer version of the same id.
    ///
    /// `queued_at` keeps its first value; optional fields only overwrite
    /// when the incoming entry carries them.
    pub fn merge(&mut self, incoming: Self) {
        self.patient_id = incoming.patient_id;
        self.patient_name = incoming.patient_name;
        self.service_type = incoming.service_type;
        self.priority = incoming.priority;
        self.status = incoming.status;
        self.last_updated = incoming.last_updated;
        self.source = incoming.source;
        if incoming.age.is_some() {
            self.age = incoming.age;
        }
        if incoming.gender.is_some() {
            self.gender = incoming.gender;
        }
        if incoming.contact.is_some() {
            self.contact = incoming.contact;
        }
        if incoming.vital_signs.is_some() {
            self.vital_signs = incoming.vital_signs;
        }
        if incoming.notes.is_some() {
            self.notes = incoming.notes;
        }
        if incoming.last_updated_by.is_some() {
            self.last_updated_by = incoming.last_updated_by;
        }
    }

    /// Record who wrote the entry and when.
    pub fn stamp(&mut self, surface: Surface, at: DateTime<Utc>) {
        self.last_updated = at;
        self.last_updated_by = Some(surface);
    }

    /// Apply the queue-visible fields of a patch.
    pub fn apply_patch(&mut self, patch: &CheckupPatch) {
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(vitals) = &patch.vital_signs {
            self.vital_signs = Some(vitals.clone());
        }
    }
}

/// Insert `entry`, or merge it into the existing entry with the same id.
///
/// Returns `true` when a new entry was appended.
pub fn upsert(queue: &mut Vec<QueueEntry>, entry: QueueEntry) -> bool {
    if let Some(existing) = queue.iter_mut().find(|e| e.id == entry.id) {
        existing.merge(entry);
        false
    } else {
        queue.push(entry);
        true
    }
}
