//! The continuous planner: a background worker that scores open work on
//! the contract landscape and nudges a handful of it forward each workday,
//! independently of anything a human asked the agent to do.

pub mod actions;
pub mod engine;
pub mod error;
pub mod gather;
pub mod scoring;
pub mod state;

pub use engine::ContinuousPlanner;
pub use error::{PlannerError, Result};
