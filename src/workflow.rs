//! Checkup workflow state machine.
//!
//! ```text
//! waiting ──notify──▶ doctor-notified ──start──▶ ongoing ──complete──▶ completed
//!    │                      │                       │
//!    └──────────cancel──────┴───────────cancel──────┴──────────────▶ cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. Conflicting writes from the two
//! surfaces are not merged: the last write wins.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::checkup::{CheckupSession, CheckupStatus, Surface};
use crate::{AppError, Result};

/// Events that move a checkup through its workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Intake announces the patient to the clinician.
    NotifyDoctor,
    /// Clinician begins the consultation.
    StartConsultation,
    /// Clinician finishes the consultation.
    Complete,
    /// Visit is abandoned.
    Cancel,
}

impl WorkflowEvent {
    /// Every event.
    pub const ALL: [Self; 4] = [
        Self::NotifyDoctor,
        Self::StartConsultation,
        Self::Complete,
        Self::Cancel,
    ];

    /// The event whose legal outcome is `target`, if any.
    ///
    /// `waiting` is only ever an initial status, so no event leads to it.
    #[must_use]
    pub fn toward(target: CheckupStatus) -> Option<Self> {
        match target {
            CheckupStatus::Waiting => None,
            CheckupStatus::DoctorNotified => Some(Self::NotifyDoctor),
            CheckupStatus::Ongoing => Some(Self::StartConsultation),
            CheckupStatus::Completed => Some(Self::Complete),
            CheckupStatus::Cancelled => Some(Self::Cancel),
        }
    }
}

impl Display for WorkflowEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotifyDoctor => f.write_str("notify_doctor"),
            Self::StartConsultation => f.write_str("start_consultation"),
            Self::Complete => f.write_str("complete"),
            Self::Cancel => f.write_str("cancel"),
        }
    }
}

/// Resolve the status reached by applying `event` in `status`.
///
/// # Errors
///
/// Returns `AppError::InvalidTransition` for any pair outside the table.
pub fn next_status(status: CheckupStatus, event: WorkflowEvent) -> Result<CheckupStatus> {
    use CheckupStatus::{Cancelled, Completed, DoctorNotified, Ongoing, Waiting};
    use WorkflowEvent::{Cancel, Complete, NotifyDoctor, StartConsultation};

    match (status, event) {
        (Waiting, NotifyDoctor) => Ok(DoctorNotified),
        (DoctorNotified, StartConsultation) => Ok(Ongoing),
        (Ongoing, Complete) => Ok(Completed),
        (Waiting | DoctorNotified | Ongoing, Cancel) => Ok(Cancelled),
        _ => Err(AppError::InvalidTransition(format!(
            "{event} is not allowed from {status}"
        ))),
    }
}

/// Whether moving directly from `from` to `to` is a legal single step.
#[must_use]
pub fn can_transition(from: CheckupStatus, to: CheckupStatus) -> bool {
    WorkflowEvent::toward(to)
        .is_some_and(|event| next_status(from, event).is_ok_and(|status| status == to))
}

/// Apply `event` to a copy of `session`, stamping the writer and time.
///
/// Entering `ongoing` sets `started_at`; entering `completed` sets
/// `completed_at`. The input session is left untouched.
///
/// # Errors
///
/// Returns `AppError::InvalidTransition` if the event is illegal from the
/// session's current status.
pub fn transition(
    session: &CheckupSession,
    event: WorkflowEvent,
    surface: Surface,
    at: DateTime<Utc>,
) -> Result<CheckupSession> {
    let status = next_status(session.status, event)?;
    let mut next = session.clone();
    next.status = status;
    match status {
        CheckupStatus::DoctorNotified => {
            next.queued_at.get_or_insert(at);
        }
        CheckupStatus::Ongoing => next.started_at = Some(at),
        CheckupStatus::Completed => next.completed_at = Some(at),
        CheckupStatus::Waiting | CheckupStatus::Cancelled => {}
    }
    next.stamp(surface, at);
    Ok(next)
}
