//! Optimistic workflow mutations on the queue and checkup slices.
//!
//! Every mutation is applied to local state first, then sent to the
//! backend. A failed call is never rolled back locally; instead the
//! mutation enters [`MutationState::Reconciling`] and the owning slice is
//! refetched from the backend, which overwrites whatever drift the
//! optimistic write left behind.
//!
//! Mutations report a [`MutationOutcome`] rather than an error so callers
//! can render inline feedback.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use super::reconcile::Reconciler;
use super::state::{Slices, WorkflowState};
use crate::backend::WorkflowBackend;
use crate::models::checkup::{
    CheckupDraft, CheckupId, CheckupPatch, CheckupSession, CheckupStatus, SessionData, Surface,
};
use crate::models::queue::{self, QueueEntry};
use crate::models::slice::SliceName;
use crate::session::SessionContext;
use crate::workflow::{self, WorkflowEvent};
use crate::{AppError, Result};

/// Lifecycle of one optimistic mutation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Applied locally; the backend has not confirmed it.
    Pending,
    /// The backend accepted the mutation.
    Confirmed,
    /// The backend rejected the mutation; the owning slice is being refetched.
    Reconciling,
}

/// Result descriptor returned by every mutation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Whether the mutation stands (locally applied and not rejected).
    pub success: bool,
    /// Human-readable failure reason.
    pub error: Option<String>,
    /// Lifecycle state reached; `None` when the mutation was refused before
    /// anything was applied.
    pub state: Option<MutationState>,
    /// Identifier of the affected record (server-assigned once confirmed).
    pub record_id: Option<CheckupId>,
}

impl MutationOutcome {
    fn confirmed(id: CheckupId) -> Self {
        Self {
            success: true,
            error: None,
            state: Some(MutationState::Confirmed),
            record_id: Some(id),
        }
    }

    fn pending(id: CheckupId) -> Self {
        Self {
            success: true,
            error: None,
            state: Some(MutationState::Pending),
            record_id: Some(id),
        }
    }

    fn reconciling(id: CheckupId, err: &AppError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            state: Some(MutationState::Reconciling),
            record_id: Some(id),
        }
    }

    fn rejected(id: Option<CheckupId>, err: &AppError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            state: None,
            record_id: id,
        }
    }
}

/// Applies clinician-queue mutations for one surface.
pub struct QueueCoordinator {
    backend: Arc<dyn WorkflowBackend>,
    session: Arc<SessionContext>,
    reconciler: Arc<Reconciler>,
    surface: Surface,
}

impl QueueCoordinator {
    /// Wire a coordinator; `surface` is stamped on every write it makes.
    #[must_use]
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        session: Arc<SessionContext>,
        reconciler: Arc<Reconciler>,
        surface: Surface,
    ) -> Self {
        Self {
            backend,
            session,
            reconciler,
            surface,
        }
    }

    fn state(&self) -> &Arc<WorkflowState> {
        self.reconciler.state()
    }

    /// Put a session on the clinician queue and notify the doctor.
    ///
    /// Idempotent by id: an existing entry is merged in place. A failed
    /// notify keeps the local entry and asks the scheduler to reconcile
    /// early.
    pub async fn enqueue(&self, session: CheckupSession) -> MutationOutcome {
        let span = info_span!("enqueue", checkup_id = %session.id);
        async move {
            let now = Utc::now();
            let mut entry = QueueEntry::from_session(&session);
            entry.stamp(self.surface, now);
            let id = entry.id.clone();

            let appended = self
                .state()
                .update_queue(|entries| queue::upsert(entries, entry.clone()))
                .await;
            debug!(appended, "queue entry applied locally");

            let Some(credential) = self.session.credential() else {
                debug!("no credential, notify deferred to next reconciliation");
                return MutationOutcome::pending(id);
            };

            match self.backend.notify_doctor(&credential, &entry).await {
                Ok(()) => {
                    let surface = self.surface;
                    let advanced = self
                        .state()
                        .try_update(|slices| {
                            let now = Utc::now();
                            let queued =
                                advance_queue_entry(&mut slices.queue, &id, surface, now);
                            advance_waiting(&mut slices.todays_checkups, &id, surface, now);
                            Ok(queued)
                        })
                        .await
                        .unwrap_or_default();
                    info!(advanced, "doctor notified");
                    MutationOutcome::confirmed(id)
                }
                Err(err) => {
                    warn!(%err, "notify failed, keeping local entry until next reconciliation");
                    self.reconciler.request_reconcile(SliceName::Queue);
                    MutationOutcome::reconciling(id, &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Move a checkup to `status`, applying `patch` alongside.
    ///
    /// The move is validated against the workflow table using the queue
    /// entry (or, failing that, today's record) as the current status.
    /// Entering a terminal status removes the entry from the queue.
    pub async fn update_status(
        &self,
        id: &CheckupId,
        status: CheckupStatus,
        patch: CheckupPatch,
    ) -> MutationOutcome {
        let span = info_span!("update_status", checkup_id = %id, %status);
        async move {
            let surface = self.surface;
            let applied = self
                .state()
                .try_update(|slices| {
                    let current = current_status(slices, id)?;
                    let event = WorkflowEvent::toward(status).ok_or_else(|| {
                        AppError::InvalidTransition(format!("no event leads to {status}"))
                    })?;
                    workflow::next_status(current, event)?;

                    let now = Utc::now();
                    if status.is_terminal() {
                        slices.queue.retain(|entry| &entry.id != id);
                    } else if let Some(entry) = slices.queue.iter_mut().find(|e| &e.id == id) {
                        entry.status = status;
                        entry.apply_patch(&patch);
                        entry.stamp(surface, now);
                    }
                    if let Some(record) = slices.todays_checkups.iter_mut().find(|r| &r.id == id) {
                        set_status(record, status, surface, now);
                        record.apply_patch(&patch);
                    }
                    Ok(())
                })
                .await;

            if let Err(err) = applied {
                warn!(%err, "status change refused");
                return MutationOutcome::rejected(Some(id.clone()), &err);
            }

            let Some(credential) = self.session.credential() else {
                debug!("no credential, status change kept locally");
                return MutationOutcome::pending(id.clone());
            };

            match self
                .backend
                .patch_queue_status(&credential, id, status, &patch)
                .await
            {
                Ok(()) => {
                    info!("status change confirmed");
                    MutationOutcome::confirmed(id.clone())
                }
                Err(err) => {
                    warn!(%err, "status change rejected, refreshing queue");
                    self.reconciler.reconcile_now(SliceName::Queue).await;
                    MutationOutcome::reconciling(id.clone(), &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Patch notes, vitals, or prescriptions of a checkup.
    pub async fn update_notes(&self, id: &CheckupId, patch: CheckupPatch) -> MutationOutcome {
        let span = info_span!("update_notes", checkup_id = %id);
        async move {
            if patch.is_empty() {
                let err = AppError::Validation("notes update carries no changes".into());
                return MutationOutcome::rejected(Some(id.clone()), &err);
            }

            let surface = self.surface;
            let applied = self
                .state()
                .try_update(|slices| {
                    let now = Utc::now();
                    let mut found = false;
                    if let Some(entry) = slices.queue.iter_mut().find(|e| &e.id == id) {
                        entry.apply_patch(&patch);
                        entry.stamp(surface, now);
                        found = true;
                    }
                    for records in [&mut slices.todays_checkups, &mut slices.doctor_checkups] {
                        if let Some(record) = records.iter_mut().find(|r| &r.id == id) {
                            record.apply_patch(&patch);
                            record.stamp(surface, now);
                            found = true;
                        }
                    }
                    if found {
                        Ok(())
                    } else {
                        Err(AppError::NotFound(format!("checkup {id} is not tracked")))
                    }
                })
                .await;

            if let Err(err) = applied {
                warn!(%err, "notes update refused");
                return MutationOutcome::rejected(Some(id.clone()), &err);
            }

            let Some(credential) = self.session.credential() else {
                debug!("no credential, notes kept locally");
                return MutationOutcome::pending(id.clone());
            };

            match self
                .backend
                .update_checkup_notes(&credential, id, &patch)
                .await
            {
                Ok(()) => {
                    info!("notes update confirmed");
                    MutationOutcome::confirmed(id.clone())
                }
                Err(err) => {
                    warn!(%err, "notes update rejected, refreshing queue and today's checkups");
                    self.reconciler.reconcile_now(SliceName::Queue).await;
                    self.reconciler
                        .reconcile_now(SliceName::TodaysCheckups)
                        .await;
                    MutationOutcome::reconciling(id.clone(), &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Finish a consultation.
    ///
    /// Removes the entry from the queue and merges a `completed` record
    /// carrying `session_data` into the clinician's checkup history. Today's
    /// record, when present, is completed in place as well.
    pub async fn complete(&self, id: &CheckupId, session_data: SessionData) -> MutationOutcome {
        let span = info_span!("complete_checkup", checkup_id = %id);
        async move {
            let surface = self.surface;
            let applied = self
                .state()
                .try_update(|slices| {
                    let current = current_status(slices, id)?;
                    workflow::next_status(current, WorkflowEvent::Complete)?;

                    let now = Utc::now();
                    let base = slices
                        .todays_checkups
                        .iter()
                        .find(|r| &r.id == id)
                        .or_else(|| slices.doctor_checkups.iter().find(|r| &r.id == id))
                        .cloned()
                        .or_else(|| {
                            slices
                                .queue
                                .iter()
                                .find(|e| &e.id == id)
                                .map(QueueEntry::to_session)
                        })
                        .ok_or_else(|| {
                            AppError::NotFound(format!("checkup {id} is not tracked"))
                        })?;

                    let mut record = base;
                    record.status = current;
                    set_status(&mut record, CheckupStatus::Completed, surface, now);
                    attach_session_data(&mut record, &session_data);

                    slices.queue.retain(|entry| &entry.id != id);
                    if let Some(today) = slices.todays_checkups.iter_mut().find(|r| &r.id == id) {
                        *today = record.clone();
                    }
                    match slices.doctor_checkups.iter_mut().find(|r| &r.id == id) {
                        Some(history) => *history = record,
                        None => slices.doctor_checkups.push(record),
                    }
                    Ok(())
                })
                .await;

            if let Err(err) = applied {
                warn!(%err, "completion refused");
                return MutationOutcome::rejected(Some(id.clone()), &err);
            }

            let Some(credential) = self.session.credential() else {
                debug!("no credential, completion kept locally");
                return MutationOutcome::pending(id.clone());
            };

            match self
                .backend
                .update_checkup_status(&credential, id, CheckupStatus::Completed, Some(&session_data))
                .await
            {
                Ok(()) => {
                    info!("checkup completed");
                    MutationOutcome::confirmed(id.clone())
                }
                Err(err) => {
                    warn!(%err, "completion rejected, refreshing queue and today's checkups");
                    self.reconciler.reconcile_now(SliceName::Queue).await;
                    self.reconciler
                        .reconcile_now(SliceName::TodaysCheckups)
                        .await;
                    MutationOutcome::reconciling(id.clone(), &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Register a new checkup from intake details.
    ///
    /// The record gets a temporary `local-` id and is appended to today's
    /// checkups and the checkup history. Once the backend creates it, the
    /// server record replaces the temporary one at the same position in
    /// both slices.
    pub async fn start_checkup(&self, draft: CheckupDraft) -> MutationOutcome {
        let session = CheckupSession::from_draft(draft, self.surface);
        let local_id = session.id.clone();
        let span = info_span!("start_checkup", checkup_id = %local_id);
        async move {
            let inserted = session.clone();
            let applied = self
                .state()
                .try_update(|slices| {
                    slices.todays_checkups.push(inserted.clone());
                    slices.doctor_checkups.push(inserted);
                    Ok(())
                })
                .await;
            if let Err(err) = applied {
                return MutationOutcome::rejected(Some(local_id), &err);
            }

            let Some(credential) = self.session.credential() else {
                debug!("no credential, checkup kept with temporary id");
                return MutationOutcome::pending(local_id);
            };

            match self.backend.create_checkup(&credential, &session).await {
                Ok(server) => {
                    let server_id = server.id.clone();
                    let replaced = self
                        .state()
                        .try_update(|slices| {
                            let mut replaced = 0;
                            for records in
                                [&mut slices.todays_checkups, &mut slices.doctor_checkups]
                            {
                                if let Some(slot) = records.iter_mut().find(|r| r.id == local_id) {
                                    *slot = server.clone();
                                    replaced += 1;
                                }
                            }
                            Ok(replaced)
                        })
                        .await
                        .unwrap_or_default();
                    info!(%server_id, replaced, "checkup created");
                    MutationOutcome::confirmed(server_id)
                }
                Err(err) => {
                    warn!(%err, "create rejected, refreshing today's checkups");
                    self.reconciler
                        .reconcile_now(SliceName::TodaysCheckups)
                        .await;
                    MutationOutcome::reconciling(local_id, &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Read a patient's checkup history straight from the backend.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` without calling the backend when no
    /// credential is present, or the backend error if the fetch fails.
    pub async fn history(&self, patient_id: &str) -> Result<Vec<CheckupSession>> {
        let credential = self
            .session
            .credential()
            .ok_or_else(|| AppError::AuthRequired("no credential, history unavailable".into()))?;
        let records = self
            .backend
            .fetch_checkup_history(&credential, patient_id)
            .await?;
        debug!(patient_id, count = records.len(), "checkup history fetched");
        Ok(records)
    }
}

/// Status of `id`, preferring the queue entry over today's record.
fn current_status(slices: &Slices, id: &CheckupId) -> Result<CheckupStatus> {
    slices
        .queue
        .iter()
        .find(|entry| &entry.id == id)
        .map(|entry| entry.status)
        .or_else(|| {
            slices
                .todays_checkups
                .iter()
                .find(|record| &record.id == id)
                .map(|record| record.status)
        })
        .ok_or_else(|| AppError::NotFound(format!("checkup {id} is not queued")))
}

/// Move `record` to `status` through the workflow table when the step is
/// legal from its own status; otherwise overwrite it (last write wins).
fn set_status(
    record: &mut CheckupSession,
    status: CheckupStatus,
    surface: Surface,
    at: chrono::DateTime<Utc>,
) {
    let stepped = WorkflowEvent::toward(status)
        .and_then(|event| workflow::transition(record, event, surface, at).ok());
    match stepped {
        Some(next) => *record = next,
        None => {
            record.status = status;
            match status {
                CheckupStatus::Ongoing => {
                    record.started_at.get_or_insert(at);
                }
                CheckupStatus::Completed => record.completed_at = Some(at),
                _ => {}
            }
            record.stamp(surface, at);
        }
    }
}

fn attach_session_data(record: &mut CheckupSession, data: &SessionData) {
    if data.notes.is_some() {
        record.notes.clone_from(&data.notes);
    }
    if data.vital_signs.is_some() {
        record.vital_signs.clone_from(&data.vital_signs);
    }
    if !data.prescriptions.is_empty() {
        record.prescriptions.clone_from(&data.prescriptions);
    }
    record.session_data = Some(data.clone());
}

fn advance_waiting(
    records: &mut [CheckupSession],
    id: &CheckupId,
    surface: Surface,
    at: chrono::DateTime<Utc>,
) {
    let Some(record) = records
        .iter_mut()
        .find(|r| &r.id == id && r.status == CheckupStatus::Waiting)
    else {
        return;
    };
    if let Ok(next) = workflow::transition(record, WorkflowEvent::NotifyDoctor, surface, at) {
        *record = next;
    }
}

/// Step a waiting queue entry to `doctor-notified`. Returns whether it moved.
fn advance_queue_entry(
    queue: &mut [QueueEntry],
    id: &CheckupId,
    surface: Surface,
    at: chrono::DateTime<Utc>,
) -> bool {
    let Some(entry) = queue.iter_mut().find(|e| &e.id == id) else {
        return false;
    };
    match workflow::next_status(entry.status, WorkflowEvent::NotifyDoctor) {
        Ok(next) => {
            entry.status = next;
            entry.stamp(surface, at);
            true
        }
        Err(_) => false,
    }
}
