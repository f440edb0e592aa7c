//! Services - sync logic and scheduling
//!
//! - `orchestrator` - Runs fetch → filter → submit → record cycles behind a run guard
//! - `scheduler` - Interval timer that drives the orchestrator

pub mod orchestrator;
pub mod scheduler;

// Re-export commonly used types
pub use orchestrator::SyncOrchestrator;
pub use scheduler::SyncScheduler;
