#![forbid(unsafe_code)]

pub mod backend;
pub mod backup;
pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod session;
pub mod sync;
pub mod workflow;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
