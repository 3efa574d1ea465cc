//! Durable step runner
//!
//! `WorkflowRun::step` is the re-entrancy point: a step whose outcome is
//! already checkpointed returns that outcome without re-executing, so a
//! workflow resumed after a crash proceeds from exactly where it stopped.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, WorkflowError};
use crate::retry::RetryPolicy;

/// Persistence for step outcomes, keyed by `(workflow_id, step_name)`.
/// Must survive process restarts for resumability to hold.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, workflow_id: &str, step: &str) -> Result<Option<serde_json::Value>>;
    async fn save(&self, workflow_id: &str, step: &str, outcome: &serde_json::Value) -> Result<()>;
    async fn clear(&self, workflow_id: &str) -> Result<()>;
}

/// One execution of a durable workflow.
pub struct WorkflowRun {
    workflow_id: String,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl WorkflowRun {
    pub fn new(workflow_id: impl Into<String>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            checkpoints,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Execute one checkpointed step.
    ///
    /// A previously recorded outcome is returned as-is. Otherwise the
    /// operation runs under the retry policy; transient errors are retried
    /// with exponential backoff, a `Precondition` error fails the step
    /// immediately, and exhausting attempts yields `StepExhausted` carrying
    /// the step name and the last error.
    pub async fn step<T, F, Fut>(&self, name: &str, policy: &RetryPolicy, op: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>> + Send,
    {
        if let Some(recorded) = self.checkpoints.load(&self.workflow_id, name).await? {
            debug!(
                workflow_id = %self.workflow_id,
                step = name,
                "Step outcome already recorded, skipping execution"
            );
            return Ok(serde_json::from_value(recorded)?);
        }

        let max_attempts = policy.maximum_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(outcome) => {
                    let value = serde_json::to_value(&outcome)?;
                    self.checkpoints
                        .save(&self.workflow_id, name, &value)
                        .await?;
                    debug!(workflow_id = %self.workflow_id, step = name, attempt, "Step completed");
                    return Ok(outcome);
                }
                Err(WorkflowError::Precondition(message)) => {
                    return Err(WorkflowError::StepFailed {
                        step: name.to_string(),
                        message,
                    });
                }
                Err(err) if attempt >= max_attempts => {
                    return Err(WorkflowError::StepExhausted {
                        step: name.to_string(),
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        workflow_id = %self.workflow_id,
                        step = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Step attempt failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Drop all recorded outcomes for this run. Called after terminal
    /// completion so checkpoints do not accumulate.
    pub async fn clear_checkpoints(&self) -> Result<()> {
        self.checkpoints.clear(&self.workflow_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryCheckpoints {
        entries: Mutex<HashMap<(String, String), serde_json::Value>>,
    }

    #[async_trait]
    impl CheckpointStore for MemoryCheckpoints {
        async fn load(&self, workflow_id: &str, step: &str) -> Result<Option<serde_json::Value>> {
            Ok(self
                .entries
                .lock()
                .get(&(workflow_id.to_string(), step.to_string()))
                .cloned())
        }

        async fn save(
            &self,
            workflow_id: &str,
            step: &str,
            outcome: &serde_json::Value,
        ) -> Result<()> {
            self.entries
                .lock()
                .insert((workflow_id.to_string(), step.to_string()), outcome.clone());
            Ok(())
        }

        async fn clear(&self, workflow_id: &str) -> Result<()> {
            self.entries.lock().retain(|(id, _), _| id != workflow_id);
            Ok(())
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_maximum_attempts(attempts)
    }

    #[tokio::test]
    async fn test_completed_step_is_not_reexecuted() {
        let store = Arc::new(MemoryCheckpoints::default());
        let calls = AtomicU32::new(0);

        let run = WorkflowRun::new("wf-1", store.clone());
        let first: u32 = run
            .step("probe", &fast_policy(3), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42u32)
            })
            .await
            .unwrap();
        assert_eq!(first, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A resumed run with the same id sees the checkpoint and skips the op.
        let resumed = WorkflowRun::new("wf-1", store);
        let second: u32 = run
            .step("probe", &fast_policy(3), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .await
            .unwrap();
        assert_eq!(second, 42);
        let third: u32 = resumed
            .step("probe", &fast_policy(3), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .await
            .unwrap();
        assert_eq!(third, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let store = Arc::new(MemoryCheckpoints::default());
        let calls = AtomicU32::new(0);

        let run = WorkflowRun::new("wf-2", store);
        let out: String = run
            .step("flaky", &fast_policy(3), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(WorkflowError::Activity("transient".into()))
                } else {
                    Ok("ok".to_string())
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_names_the_step() {
        let store = Arc::new(MemoryCheckpoints::default());
        let run = WorkflowRun::new("wf-3", store);
        let err = run
            .step::<u32, _, _>("deploy-artifact", &fast_policy(2), || async {
                Err(WorkflowError::Activity("edge api down".into()))
            })
            .await
            .unwrap_err();
        let (step, message) = err.terminal_step().unwrap();
        assert_eq!(step, "deploy-artifact");
        assert!(message.contains("edge api down"));
    }

    #[tokio::test]
    async fn test_precondition_is_not_retried() {
        let store = Arc::new(MemoryCheckpoints::default());
        let calls = AtomicU32::new(0);
        let run = WorkflowRun::new("wf-4", store);
        let err = run
            .step::<u32, _, _>("check-artifact-exists", &fast_policy(5), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WorkflowError::Precondition("missing credentials".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, WorkflowError::StepFailed { .. }));
    }

    #[tokio::test]
    async fn test_clear_checkpoints() {
        let store = Arc::new(MemoryCheckpoints::default());
        let run = WorkflowRun::new("wf-5", store.clone());
        run.step("a", &fast_policy(1), || async { Ok(1u32) })
            .await
            .unwrap();
        run.clear_checkpoints().await.unwrap();
        assert!(store.load("wf-5", "a").await.unwrap().is_none());
    }
}
