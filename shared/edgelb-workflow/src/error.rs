//! Error types for the workflow engine

/// Result type alias
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Workflow engine errors
///
/// `Activity`, `Delivery` and `Storage` are transient and retried by the
/// step runner; `Precondition` is not retried; `StepExhausted` and
/// `StepFailed` are terminal and carry the step they happened in.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Step '{step}' failed after exhausting retries: {message}")]
    StepExhausted { step: String, message: String },

    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Activity error: {0}")]
    Activity(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    /// Step name and message for terminal step errors.
    pub fn terminal_step(&self) -> Option<(&str, &str)> {
        match self {
            Self::StepExhausted { step, message } | Self::StepFailed { step, message } => {
                Some((step, message))
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}
