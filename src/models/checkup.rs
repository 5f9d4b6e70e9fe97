//! Checkup session model: one patient visit from intake to completion.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Prefix marking identifiers assigned locally before the backend confirms.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Stable checkup identifier shared by the queue and checkup slices.
///
/// The backend hands out numeric ids while locally created records carry
/// a `local-` prefixed UUID, so both representations deserialize here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CheckupId(String);

impl CheckupId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a temporary identifier for a record not yet known to the backend.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this identifier was assigned locally.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CheckupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for CheckupId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CheckupId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for CheckupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for CheckupId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(Self(n.to_string())),
            RawId::Text(s) => Ok(Self(s)),
        }
    }
}

/// Workflow status of a checkup session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CheckupStatus {
    /// Registered at intake, not yet announced to a clinician.
    Waiting,
    /// Clinician has been notified and the patient is queued.
    DoctorNotified,
    /// Consultation in progress.
    Ongoing,
    /// Consultation finished (terminal).
    Completed,
    /// Visit abandoned (terminal).
    Cancelled,
}

impl CheckupStatus {
    /// Every status, in workflow order.
    pub const ALL: [Self; 5] = [
        Self::Waiting,
        Self::DoctorNotified,
        Self::Ongoing,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::DoctorNotified => "doctor-notified",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for CheckupStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard surface that performed a write.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// Front-desk / admin intake dashboard.
    #[default]
    Admin,
    /// Clinician console.
    Doctor,
}

impl Display for Surface {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Doctor => f.write_str("doctor"),
        }
    }
}

/// Triage priority assigned at intake.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Routine visit.
    #[default]
    Normal,
    /// Should be seen ahead of routine visits.
    Urgent,
    /// Immediate attention.
    Emergency,
}

/// Workflow that created the session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckupSource {
    /// Staff registered the patient at the front desk.
    #[default]
    Manual,
    /// Generated by the training/demo simulation.
    Simulated,
}

/// Denormalized patient details carried on the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PatientSnapshot {
    /// Display name.
    pub name: String,
    /// Age in years.
    #[serde(default)]
    pub age: Option<u32>,
    /// Gender as recorded at intake.
    #[serde(default)]
    pub gender: Option<String>,
    /// Phone or other contact detail.
    #[serde(default)]
    pub contact: Option<String>,
}

/// Vital signs captured during triage or consultation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct VitalSigns {
    /// Blood pressure, e.g. `120/80`.
    #[serde(default)]
    pub blood_pressure: Option<String>,
    /// Body temperature in °C.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Beats per minute.
    #[serde(default)]
    pub heart_rate: Option<u32>,
    /// Breaths per minute.
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    /// Weight in kilograms.
    #[serde(default)]
    pub weight_kg: Option<f32>,
    /// Height in centimetres.
    #[serde(default)]
    pub height_cm: Option<f32>,
}

/// One prescribed medication.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Prescription {
    /// Medication name.
    pub medication: String,
    /// Dose per administration.
    #[serde(default)]
    pub dosage: Option<String>,
    /// How often to take it.
    #[serde(default)]
    pub frequency: Option<String>,
    /// Treatment length.
    #[serde(default)]
    pub duration: Option<String>,
    /// Free-text instructions.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Clinician output attached to a completed session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionData {
    /// Diagnosis summary.
    #[serde(default)]
    pub diagnosis: Option<String>,
    /// Consultation notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Prescriptions issued, in order.
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
    /// Final vital signs.
    #[serde(default)]
    pub vital_signs: Option<VitalSigns>,
    /// Suggested follow-up date.
    #[serde(default)]
    pub follow_up: Option<NaiveDate>,
}

/// Partial update to the clinical fields of a session.
///
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CheckupPatch {
    /// Replacement notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Replacement vital signs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vital_signs: Option<VitalSigns>,
    /// Replacement prescription list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescriptions: Option<Vec<Prescription>>,
}

impl CheckupPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.vital_signs.is_none() && self.prescriptions.is_none()
    }
}

/// Intake details for a session that has no identifier yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CheckupDraft {
    /// Patient record identifier.
    pub patient_id: String,
    /// Denormalized patient details.
    pub patient: PatientSnapshot,
    /// Requested service, e.g. `Consultation`.
    pub service_type: String,
    /// Triage priority.
    #[serde(default)]
    pub priority: Priority,
    /// Originating workflow.
    #[serde(default)]
    pub source: CheckupSource,
}

/// A patient visit as it moves through the clinic workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CheckupSession {
    /// Stable identifier.
    pub id: CheckupId,
    /// Patient record identifier.
    pub patient_id: String,
    /// Denormalized patient details.
    #[serde(default)]
    pub patient: PatientSnapshot,
    /// Current workflow status.
    pub status: CheckupStatus,
    /// Requested service, e.g. `Consultation`.
    pub service_type: String,
    /// Triage priority.
    #[serde(default)]
    pub priority: Priority,
    /// Latest vital signs.
    #[serde(default)]
    pub vital_signs: Option<VitalSigns>,
    /// Clinician notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Prescriptions, in the order issued.
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
    /// When the session entered the clinician queue.
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
    /// When the consultation started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the consultation finished.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last write timestamp.
    pub last_updated: DateTime<Utc>,
    /// Surface that performed the last write.
    #[serde(default)]
    pub last_updated_by: Option<Surface>,
    /// Originating workflow.
    #[serde(default)]
    pub source: CheckupSource,
    /// Clinician output, present once completed.
    #[serde(default)]
    pub session_data: Option<SessionData>,
}

impl CheckupSession {
    /// Construct a `waiting` session for the given patient.
    #[must_use]
    pub fn new(
        id: impl Into<CheckupId>,
        patient_id: impl Into<String>,
        patient: PatientSnapshot,
        service_type: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            patient_id: patient_id.into(),
            patient,
            status: CheckupStatus::Waiting,
            service_type: service_type.into(),
            priority,
            vital_signs: None,
            notes: None,
            prescriptions: Vec::new(),
            queued_at: None,
            started_at: None,
            completed_at: None,
            last_updated: Utc::now(),
            last_updated_by: None,
            source: CheckupSource::Manual,
            session_data: None,
        }
    }

    /// Build a locally identified session from intake details.
    #[must_use]
    pub fn from_draft(draft: CheckupDraft, surface: Surface) -> Self {
        let mut session = Self::new(
            CheckupId::local(),
            draft.patient_id,
            draft.patient,
            draft.service_type,
            draft.priority,
        );
        session.source = draft.source;
        session.last_updated_by = Some(surface);
        session
    }

    /// Record who wrote the session and when.
    pub fn stamp(&mut self, surface: Surface, at: DateTime<Utc>) {
        self.last_updated = at;
        self.last_updated_by = Some(surface);
    }

    /// Apply the non-empty fields of a patch.
    pub fn apply_patch(&mut self, patch: &CheckupPatch) {
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(vitals) = &patch.vital_signs {
            self.vital_signs = Some(vitals.clone());
        }
        if let Some(prescriptions) = &patch.prescriptions {
            self.prescriptions.clone_from(prescriptions);
        }
    }
}
