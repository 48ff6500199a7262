//! Run orchestration

pub mod orchestrator;
pub mod summary;

pub use orchestrator::{Orchestrator, RunContext};
pub use summary::{RunSummary, Termination};
