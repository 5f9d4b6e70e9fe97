//! Full-replace reconciliation of the queue and today's-checkups slices.
//!
//! A refresh always replaces the whole slice with the backend's snapshot,
//! so any optimistic drift is discarded in one step. Refreshes are gated
//! and sequenced per resource (see [`gate`](super::gate)).

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::gate::{RefreshTicket, ResourceGate};
use super::state::WorkflowState;
use crate::backend::WorkflowBackend;
use crate::models::slice::SliceName;
use crate::session::SessionContext;
use crate::{AppError, Result};

/// How a refresh interacts with outstanding refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Timer or visibility driven; skipped while another refresh is outstanding.
    Scheduled,
    /// Triggered by a failed mutation; always runs and supersedes older refreshes.
    Forced,
}

/// What a single refresh attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot replaced the local slice.
    Applied {
        /// Records in the new slice.
        count: usize,
    },
    /// Another refresh of the same resource was outstanding.
    SkippedInFlight,
    /// No credential; the backend was not called.
    SkippedUnauthenticated,
    /// A newer refresh was issued while this one was outstanding.
    Stale,
}

/// Refreshes reconciled slices from the backend.
pub struct Reconciler {
    backend: Arc<dyn WorkflowBackend>,
    session: Arc<SessionContext>,
    state: Arc<WorkflowState>,
    queue_gate: ResourceGate,
    todays_gate: ResourceGate,
    requested: Notify,
}

impl Reconciler {
    /// Wire a reconciler to its collaborators.
    #[must_use]
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        session: Arc<SessionContext>,
        state: Arc<WorkflowState>,
    ) -> Self {
        Self {
            backend,
            session,
            state,
            queue_gate: ResourceGate::new(SliceName::Queue),
            todays_gate: ResourceGate::new(SliceName::TodaysCheckups),
            requested: Notify::new(),
        }
    }

    /// Replace the queue slice with the backend snapshot.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the fetch fails; local state is untouched.
    pub async fn refresh_queue(&self, mode: RefreshMode) -> Result<RefreshOutcome> {
        let Some(credential) = self.session.credential() else {
            debug!(slice = %SliceName::Queue, "no credential, refresh skipped");
            return Ok(RefreshOutcome::SkippedUnauthenticated);
        };
        let Some(ticket) = Self::ticket(&self.queue_gate, mode) else {
            return Ok(RefreshOutcome::SkippedInFlight);
        };

        let entries = self.backend.fetch_queue(&credential).await?;
        let count = entries.len();
        let applied = self
            .state
            .replace_queue_if(entries, || ticket.is_current())
            .await;

        Ok(Self::finish(&ticket, SliceName::Queue, applied, count))
    }

    /// Replace the today's-checkups slice with the backend snapshot.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the fetch fails; local state is untouched.
    pub async fn refresh_todays_checkups(&self, mode: RefreshMode) -> Result<RefreshOutcome> {
        let Some(credential) = self.session.credential() else {
            debug!(slice = %SliceName::TodaysCheckups, "no credential, refresh skipped");
            return Ok(RefreshOutcome::SkippedUnauthenticated);
        };
        let Some(ticket) = Self::ticket(&self.todays_gate, mode) else {
            return Ok(RefreshOutcome::SkippedInFlight);
        };

        let records = self.backend.fetch_todays_checkups(&credential).await?;
        let count = records.len();
        let applied = self
            .state
            .replace_todays_checkups_if(records, || ticket.is_current())
            .await;

        Ok(Self::finish(&ticket, SliceName::TodaysCheckups, applied, count))
    }

    /// Refresh a reconciled slice by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for slices that are not reconciled from
    /// the backend, or the backend error if the fetch fails.
    pub async fn refresh(&self, slice: SliceName, mode: RefreshMode) -> Result<RefreshOutcome> {
        match slice {
            SliceName::Queue => self.refresh_queue(mode).await,
            SliceName::TodaysCheckups => self.refresh_todays_checkups(mode).await,
            other => Err(AppError::NotFound(format!(
                "slice {other} is not reconciled from the backend"
            ))),
        }
    }

    /// Refresh both reconciled slices concurrently, logging failures.
    ///
    /// Background passes never surface errors; the next pass retries.
    pub async fn reconcile_pass(&self, mode: RefreshMode) {
        let (queue, todays) = tokio::join!(
            self.refresh_queue(mode),
            self.refresh_todays_checkups(mode)
        );
        for (slice, result) in [
            (SliceName::Queue, queue),
            (SliceName::TodaysCheckups, todays),
        ] {
            match result {
                Ok(outcome) => debug!(%slice, ?outcome, "reconciliation finished"),
                Err(err) => warn!(%slice, %err, "reconciliation failed, retrying next pass"),
            }
        }
    }

    /// Forced refresh after a failed mutation; errors are logged only.
    pub async fn reconcile_now(&self, slice: SliceName) {
        match self.refresh(slice, RefreshMode::Forced).await {
            Ok(outcome) => info!(%slice, ?outcome, "forced reconciliation finished"),
            Err(err) => warn!(%slice, %err, "forced reconciliation failed"),
        }
    }

    /// Ask the scheduler to reconcile at its next opportunity.
    pub fn request_reconcile(&self, slice: SliceName) {
        debug!(%slice, "early reconciliation requested");
        self.requested.notify_one();
    }

    /// Resolves when [`request_reconcile`](Self::request_reconcile) has been called.
    pub async fn reconcile_requested(&self) {
        self.requested.notified().await;
    }

    /// Gate guarding queue refreshes.
    #[must_use]
    pub fn queue_gate(&self) -> &ResourceGate {
        &self.queue_gate
    }

    /// Gate guarding today's-checkups refreshes.
    #[must_use]
    pub fn todays_gate(&self) -> &ResourceGate {
        &self.todays_gate
    }

    /// Shared state this reconciler writes to.
    #[must_use]
    pub fn state(&self) -> &Arc<WorkflowState> {
        &self.state
    }

    fn ticket(gate: &ResourceGate, mode: RefreshMode) -> Option<RefreshTicket<'_>> {
        match mode {
            RefreshMode::Forced => Some(gate.begin_forced()),
            RefreshMode::Scheduled => {
                let ticket = gate.try_begin();
                if ticket.is_none() {
                    debug!(slice = %gate.resource(), "refresh already in flight, tick skipped");
                }
                ticket
            }
        }
    }

    fn finish(
        ticket: &RefreshTicket<'_>,
        slice: SliceName,
        applied: bool,
        count: usize,
    ) -> RefreshOutcome {
        if applied {
            debug!(%slice, count, sequence = ticket.sequence(), "slice replaced from backend");
            RefreshOutcome::Applied { count }
        } else {
            info!(%slice, sequence = ticket.sequence(), "stale response discarded");
            RefreshOutcome::Stale
        }
    }
}
