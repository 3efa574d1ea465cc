//! Durable step-workflow engine for the edgelb platform
//!
//! A workflow is a multi-step, checkpointed unit of execution: each step's
//! outcome is persisted keyed by `(workflowId, stepName)`, so re-execution
//! after a crash resumes from the first incomplete step instead of
//! restarting. Steps retry with bounded exponential backoff.

mod error;
mod retry;
mod runner;

pub use error::{Result, WorkflowError};
pub use retry::RetryPolicy;
pub use runner::{CheckpointStore, WorkflowRun};

/// Re-export for convenience
pub mod prelude {
    pub use super::{CheckpointStore, Result, RetryPolicy, WorkflowError, WorkflowRun};
}
