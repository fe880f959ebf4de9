//! The dunning-ladder scheduler — four periodic tasks that run over the
//! file-tree store with no database of their own: escalating reminders,
//! a Friday digest, a Tuesday coverage scan, and a daily thread-registry
//! sweep.

pub mod coverage;
pub mod digest;
pub mod engine;
pub mod error;
pub mod gc;
pub mod reminders;
pub mod schedule;
pub mod templates;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
