//! Inactivity timeout for the operator session.
//!
//! The monitor walks `Idle → Warning → Expired`. Qualifying input calls
//! [`InactivityHandle::record_activity`], which restarts the idle window
//! while in `Idle`. Once the warning countdown has started only
//! [`InactivityHandle::extend_session`] returns to `Idle`. When the countdown
//! reaches zero the monitor logs the operator out and exits.
//!
//! The monitor also exits if the session is ended elsewhere.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{AuthState, LogoutReason, SessionContext};

/// Observable state of the inactivity timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityState {
    /// Operator is active; the idle window is running.
    Idle,
    /// Expiry is near; the surface should offer to extend the session.
    Warning {
        /// Whole seconds left before forced logout.
        remaining_seconds: u64,
    },
    /// The session was ended for inactivity.
    Expired,
}

/// Builder for the session inactivity timer.
///
/// Call [`spawn`](Self::spawn) to start the background task.
pub struct InactivityMonitor {
    session: Arc<SessionContext>,
    timeout: Duration,
    warning_lead: Duration,
    cancel: CancellationToken,
}

impl InactivityMonitor {
    /// Construct a monitor (does not start the timer yet).
    ///
    /// `warning_lead` is how long before `timeout` the warning starts.
    #[must_use]
    pub fn new(
        session: Arc<SessionContext>,
        timeout: Duration,
        warning_lead: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            timeout,
            warning_lead,
            cancel,
        }
    }

    /// Spawn the background timer task and return a handle for controlling it.
    #[must_use]
    pub fn spawn(self) -> InactivityHandle {
        let (activity, activity_rx) = watch::channel(0u64);
        let (extend, extend_rx) = watch::channel(0u64);
        let (state_tx, state_rx) = watch::channel(InactivityState::Idle);
        let cancel_for_handle = self.cancel.clone();

        let task_handle = tokio::spawn(
            Self::run(
                self.session,
                self.timeout,
                self.warning_lead,
                self.cancel,
                activity_rx,
                extend_rx,
                state_tx,
            )
            .instrument(info_span!("inactivity_monitor")),
        );

        InactivityHandle {
            activity,
            extend,
            state_rx,
            join_handle: Some(task_handle),
            cancel: cancel_for_handle,
        }
    }

    async fn run(
        session: Arc<SessionContext>,
        timeout: Duration,
        warning_lead: Duration,
        cancel: CancellationToken,
        mut activity: watch::Receiver<u64>,
        mut extend: watch::Receiver<u64>,
        state_tx: watch::Sender<InactivityState>,
    ) {
        let idle_window = timeout.saturating_sub(warning_lead);
        let mut auth_rx = session.subscribe();

        'session: loop {
            state_tx.send_replace(InactivityState::Idle);

            // ── Idle window ──────────────────────────────────
            let idle_elapsed = tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(idle_window) => true,
                changed = activity.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    false
                }
                changed = extend.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    false
                }
                _ = auth_rx.changed() => {
                    if signed_out(&auth_rx) {
                        debug!("session ended elsewhere, inactivity monitor stopping");
                        return;
                    }
                    false
                }
            };

            if !idle_elapsed {
                continue;
            }

            // ── Warning countdown ────────────────────────────
            // Only an extension made after the warning starts counts.
            extend.mark_unchanged();
            let deadline = Instant::now() + warning_lead;
            info!(
                remaining_seconds = warning_lead.as_secs(),
                "session about to expire"
            );

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }

                state_tx.send_replace(InactivityState::Warning {
                    remaining_seconds: ceil_seconds(remaining),
                });

                // Land on whole-second boundaries so the countdown reads cleanly.
                let step = match remaining.subsec_nanos() {
                    0 => Duration::from_secs(1),
                    nanos => Duration::from_nanos(u64::from(nanos)),
                };

                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(step) => {}
                    changed = extend.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        info!("session extended by operator");
                        continue 'session;
                    }
                    _ = auth_rx.changed() => {
                        if signed_out(&auth_rx) {
                            debug!("session ended during warning, inactivity monitor stopping");
                            return;
                        }
                    }
                }
            }

            // ── Expired ──────────────────────────────────────
            state_tx.send_replace(InactivityState::Expired);
            warn!(timeout_secs = timeout.as_secs(), "session expired after inactivity");
            session.logout(LogoutReason::Inactivity).await;
            return;
        }
    }
}

fn signed_out(auth_rx: &watch::Receiver<AuthState>) -> bool {
    matches!(*auth_rx.borrow(), AuthState::Unauthenticated { .. })
}

fn ceil_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Handle returned from [`InactivityMonitor::spawn`].
pub struct InactivityHandle {
    activity: watch::Sender<u64>,
    extend: watch::Sender<u64>,
    state_rx: watch::Receiver<InactivityState>,
    join_handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Drop for InactivityHandle {
    /// Cancel the background timer task when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl InactivityHandle {
    /// Restart the idle window (qualifying user input). Ignored during the warning.
    pub fn record_activity(&self) {
        self.activity.send_modify(|seen| *seen = seen.wrapping_add(1));
    }

    /// Dismiss the warning and return to `Idle`.
    pub fn extend_session(&self) {
        self.extend.send_modify(|seen| *seen = seen.wrapping_add(1));
    }

    /// Current timer state.
    #[must_use]
    pub fn state(&self) -> InactivityState {
        *self.state_rx.borrow()
    }

    /// Subscribe to timer state changes (e.g. to render the countdown).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<InactivityState> {
        self.state_rx.clone()
    }

    /// Wait for the monitor to exit on its own (expiry or external logout).
    pub async fn wait(mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }

    /// Stop the monitor and wait for the task to exit.
    pub async fn await_completion(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
