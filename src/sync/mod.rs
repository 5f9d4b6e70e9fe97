//! Client-side workflow synchronization.
//!
//! Covers the in-memory slice aggregate, optimistic queue mutations,
//! full-replace reconciliation against the backend, and the periodic
//! scheduler that drives it.

pub mod coordinator;
pub mod gate;
pub mod reconcile;
pub mod scheduler;
pub mod state;

pub use coordinator::{MutationOutcome, MutationState, QueueCoordinator};
pub use gate::{RefreshTicket, ResourceGate};
pub use reconcile::{Reconciler, RefreshMode, RefreshOutcome};
pub use scheduler::{SchedulerStats, SyncScheduler, SyncSchedulerHandle};
pub use state::{SliceSet, Slices, WorkflowState};
