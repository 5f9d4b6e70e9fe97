//! Interval- and visibility-driven reconciliation.
//!
//! The scheduler runs a full reconciliation pass on a fixed interval, when
//! the surface becomes visible again, and when a mutation requests early
//! reconciliation. Nothing runs while the surface is hidden. Each pass is
//! spawned on its own task so a slow backend never delays the next tick;
//! the per-resource gates inside [`Reconciler`] skip ticks that would
//! overlap an outstanding refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::reconcile::{Reconciler, RefreshMode};

/// Counters describing what the scheduler has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Reconciliation passes started.
    pub passes_started: u64,
    /// Ticks or requests dropped because the surface was hidden.
    pub skipped_hidden: u64,
}

#[derive(Debug, Default)]
struct Counters {
    passes_started: AtomicU64,
    skipped_hidden: AtomicU64,
}

/// Builder for the background reconciliation loop.
///
/// Call [`spawn`](Self::spawn) to start it.
pub struct SyncScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    visible: bool,
    cancel: CancellationToken,
}

impl SyncScheduler {
    /// Construct a scheduler for a visible surface (does not start it yet).
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            reconciler,
            interval,
            visible: true,
            cancel,
        }
    }

    /// Start hidden; the first pass then waits for visibility.
    #[must_use]
    pub fn start_hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Spawn the loop and return a handle for controlling it.
    #[must_use]
    pub fn spawn(self) -> SyncSchedulerHandle {
        let (visible_tx, visible_rx) = watch::channel(self.visible);
        let counters = Arc::new(Counters::default());
        let cancel_for_handle = self.cancel.clone();

        let task_handle = tokio::spawn(
            Self::run(
                self.reconciler,
                self.interval,
                self.cancel,
                visible_rx,
                Arc::clone(&counters),
            )
            .instrument(info_span!("sync_scheduler")),
        );

        SyncSchedulerHandle {
            visible_tx,
            counters,
            join_handle: Some(task_handle),
            cancel: cancel_for_handle,
        }
    }

    async fn run(
        reconciler: Arc<Reconciler>,
        interval: Duration,
        cancel: CancellationToken,
        mut visible_rx: watch::Receiver<bool>,
        counters: Arc<Counters>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = JoinSet::new();
        let mut visible = *visible_rx.borrow_and_update();

        info!(interval_secs = interval.as_secs(), visible, "sync scheduler started");

        loop {
            let trigger = tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => "interval",
                changed = visible_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_visible = *visible_rx.borrow_and_update();
                    let regained = now_visible && !visible;
                    visible = now_visible;
                    if !regained {
                        debug!(visible, "visibility changed");
                        continue;
                    }
                    ticker.reset();
                    "visibility"
                }
                () = reconciler.reconcile_requested() => "request",
                Some(_) = passes.join_next(), if !passes.is_empty() => continue,
            };

            if !visible {
                counters.skipped_hidden.fetch_add(1, Ordering::SeqCst);
                debug!(trigger, "surface hidden, reconciliation skipped");
                continue;
            }

            let pass = counters.passes_started.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(trigger, pass, "reconciliation pass started");
            let reconciler = Arc::clone(&reconciler);
            passes.spawn(
                async move { reconciler.reconcile_pass(RefreshMode::Scheduled).await }
                    .instrument(info_span!("reconcile_pass", pass, trigger)),
            );
        }

        passes.shutdown().await;
        info!("sync scheduler stopped");
    }
}

/// Handle returned from [`SyncScheduler::spawn`].
pub struct SyncSchedulerHandle {
    visible_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
    join_handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Drop for SyncSchedulerHandle {
    /// Stop the loop when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SyncSchedulerHandle {
    /// Report surface visibility; becoming visible triggers an immediate pass.
    pub fn set_visible(&self, visible: bool) {
        self.visible_tx.send_if_modified(|current| {
            let changed = *current != visible;
            *current = visible;
            changed
        });
    }

    /// Last reported visibility.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        *self.visible_tx.borrow()
    }

    /// Snapshot of the scheduler counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            passes_started: self.counters.passes_started.load(Ordering::SeqCst),
            skipped_hidden: self.counters.skipped_hidden.load(Ordering::SeqCst),
        }
    }

    /// Stop the loop, abort outstanding passes, and wait for it to exit.
    pub async fn await_completion(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
