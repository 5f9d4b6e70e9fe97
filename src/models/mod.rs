//! Domain model module declarations.

pub mod backup;
pub mod checkup;
pub mod queue;
pub mod slice;
