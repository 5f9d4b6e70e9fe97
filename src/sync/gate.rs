//! Per-resource refresh gate with stale-response sequencing.
//!
//! A scheduled refresh only starts when no other refresh of the same
//! resource is outstanding; otherwise the tick is skipped, not queued.
//! Every refresh, scheduled or forced, takes a ticket from a monotonically
//! increasing counter, and its response may only be applied while its
//! ticket is still the latest one issued.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::models::slice::SliceName;

/// Refresh bookkeeping for one reconciled resource.
#[derive(Debug)]
pub struct ResourceGate {
    resource: SliceName,
    in_flight: AtomicUsize,
    issued: AtomicU64,
}

impl ResourceGate {
    /// Create an idle gate.
    #[must_use]
    pub fn new(resource: SliceName) -> Self {
        Self {
            resource,
            in_flight: AtomicUsize::new(0),
            issued: AtomicU64::new(0),
        }
    }

    /// Start a refresh unless one is already outstanding.
    #[must_use]
    pub fn try_begin(&self) -> Option<RefreshTicket<'_>> {
        self.in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(self.issue())
    }

    /// Start a refresh regardless of outstanding ones.
    ///
    /// The new ticket supersedes every earlier one.
    #[must_use]
    pub fn begin_forced(&self) -> RefreshTicket<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.issue()
    }

    /// Whether any refresh of this resource is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Sequence number of the most recently issued ticket.
    #[must_use]
    pub fn latest(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Resource this gate guards.
    #[must_use]
    pub fn resource(&self) -> SliceName {
        self.resource
    }

    fn issue(&self) -> RefreshTicket<'_> {
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        RefreshTicket {
            gate: self,
            sequence,
        }
    }
}

/// Proof that a refresh is outstanding; releases the gate on drop.
#[derive(Debug)]
pub struct RefreshTicket<'a> {
    gate: &'a ResourceGate,
    sequence: u64,
}

impl RefreshTicket<'_> {
    /// Whether no newer refresh has been issued since this one.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.gate.latest() == self.sequence
    }

    /// This ticket's sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
