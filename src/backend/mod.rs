//! Backend seam for the checkup workflow endpoints.
//!
//! [`WorkflowBackend`] is the only way the engine reaches the clinic API.
//! Every method takes the caller's [`Credential`]; callers obtain it from
//! the injected [`SessionContext`] and skip the call when there is none.

pub mod http;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::checkup::{CheckupId, CheckupPatch, CheckupSession, CheckupStatus, SessionData};
use crate::models::queue::QueueEntry;
use crate::session::{Credential, SessionContext};
use crate::{AppError, Result};

pub use http::HttpBackend;

/// Boxed future returned by backend calls.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Default hard timeout for [`probe`].
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Clinic API operations consumed by the workflow engine.
///
/// Implementations return `AppError::Network` for rejected calls and
/// non-success responses, and `AppError::AuthRequired` when the backend
/// refuses the credential.
pub trait WorkflowBackend: Send + Sync {
    /// Read the clinician queue (authoritative full snapshot).
    fn fetch_queue<'a>(&'a self, credential: &'a Credential) -> BackendFuture<'a, Vec<QueueEntry>>;

    /// Read today's checkups (authoritative full snapshot).
    fn fetch_todays_checkups<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BackendFuture<'a, Vec<CheckupSession>>;

    /// Create a checkup; the backend assigns the permanent id.
    fn create_checkup<'a>(
        &'a self,
        credential: &'a Credential,
        session: &'a CheckupSession,
    ) -> BackendFuture<'a, CheckupSession>;

    /// Set a checkup's status, attaching clinician output when completing.
    fn update_checkup_status<'a>(
        &'a self,
        credential: &'a Credential,
        id: &'a CheckupId,
        status: CheckupStatus,
        session_data: Option<&'a SessionData>,
    ) -> BackendFuture<'a, ()>;

    /// Update notes, vitals, or prescriptions of a checkup.
    fn update_checkup_notes<'a>(
        &'a self,
        credential: &'a Credential,
        id: &'a CheckupId,
        patch: &'a CheckupPatch,
    ) -> BackendFuture<'a, ()>;

    /// Read a patient's checkup history.
    fn fetch_checkup_history<'a>(
        &'a self,
        credential: &'a Credential,
        patient_id: &'a str,
    ) -> BackendFuture<'a, Vec<CheckupSession>>;

    /// Announce a queued patient to the clinician.
    fn notify_doctor<'a>(
        &'a self,
        credential: &'a Credential,
        entry: &'a QueueEntry,
    ) -> BackendFuture<'a, ()>;

    /// Patch the status (and queue-visible fields) of a queue entry.
    fn patch_queue_status<'a>(
        &'a self,
        credential: &'a Credential,
        id: &'a CheckupId,
        status: CheckupStatus,
        patch: &'a CheckupPatch,
    ) -> BackendFuture<'a, ()>;

    /// Liveness check.
    fn health<'a>(&'a self, credential: &'a Credential) -> BackendFuture<'a, ()>;
}

/// Check backend reachability under a hard timeout.
///
/// # Errors
///
/// Returns `AppError::AuthRequired` without calling the backend when no
/// credential is present, `AppError::Network` when the probe fails or does
/// not answer within `timeout`.
pub async fn probe(
    backend: &dyn WorkflowBackend,
    session: &SessionContext,
    timeout: Duration,
) -> Result<()> {
    let credential = session
        .credential()
        .ok_or_else(|| AppError::AuthRequired("no credential, probe skipped".into()))?;

    match tokio::time::timeout(timeout, backend.health(&credential)).await {
        Ok(Ok(())) => {
            info!("backend reachable");
            Ok(())
        }
        Ok(Err(err)) => {
            warn!(%err, "backend probe failed");
            Err(err)
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis(), "backend probe timed out");
            Err(AppError::Network(format!(
                "health probe timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}
