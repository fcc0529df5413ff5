//! Services - business logic
//!
//! This module contains the job's core logic:
//! - `pipeline` - The three-stage expiry run (classify, reclassify, notify)
//! - `scheduler` - Periodic trigger with at-most-one-run guard

pub mod pipeline;
pub mod scheduler;

// Re-export commonly used types
pub use pipeline::{ExpiryPipeline, PipelineError, ReclassifyReport, RunReport};
pub use scheduler::{ExpiryScheduler, LastRun, TriggerOutcome};
