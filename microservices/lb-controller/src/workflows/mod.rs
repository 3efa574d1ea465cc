//! Durable workflows and their launcher
//!
//! Workflows run as independent tasks and talk to actors only through
//! their handles. Every spawn is recorded in a durable pending index
//! before the first step executes; on boot the launcher re-spawns
//! whatever is still pending, and completed steps are skipped through
//! their checkpoints.

pub mod deploy;
pub mod monitor;

#[cfg(test)]
mod tests;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use edgelb_core::{EdgelbError, Result, WorkflowStatusEvent};
use edgelb_workflow::CheckpointStore;

use crate::actors::ActorDirectory;
use crate::infrastructure::storage::{keys, put_json, DurableStore, StoreCheckpoints};
use crate::infrastructure::{EdgePlatform, ProbeClient};

pub use deploy::DeployInput;

/// Input of one monitor workflow; also the message the timer-owning actor
/// sends to request a spawn. The actor picks the workflow id so it can
/// record it before the workflow exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRequest {
    pub workflow_id: String,
    pub load_balancer_name: String,
    pub host: String,
    pub probe_path: String,
}

/// Durable record of a workflow that has been spawned but not finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PendingWorkflow {
    Monitor(MonitorRequest),
    Deploy(DeployInput),
}

pub(crate) struct LauncherInner {
    pub store: Arc<dyn DurableStore>,
    pub checkpoints: Arc<StoreCheckpoints>,
    pub directory: Arc<ActorDirectory>,
    pub platform: Arc<dyn EdgePlatform>,
    pub probe: ProbeClient,
    pub statuses: DashMap<String, WorkflowStatusEvent>,
}

impl LauncherInner {
    pub fn checkpoint_store(&self) -> Arc<dyn CheckpointStore> {
        self.checkpoints.clone()
    }
}

/// Spawns, resumes and tracks workflows.
#[derive(Clone)]
pub struct WorkflowLauncher {
    inner: Arc<LauncherInner>,
}

impl WorkflowLauncher {
    pub fn new(
        store: Arc<dyn DurableStore>,
        directory: Arc<ActorDirectory>,
        platform: Arc<dyn EdgePlatform>,
        probe: ProbeClient,
    ) -> Self {
        Self {
            inner: Arc::new(LauncherInner {
                checkpoints: Arc::new(StoreCheckpoints::new(store.clone())),
                store,
                directory,
                platform,
                probe,
                statuses: DashMap::new(),
            }),
        }
    }

    /// Drain monitor spawn requests coming from the actors' timers.
    pub fn listen(&self, mut rx: mpsc::UnboundedReceiver<MonitorRequest>) -> JoinHandle<()> {
        let launcher = self.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                launcher.spawn_monitor(request).await;
            }
        })
    }

    async fn spawn_monitor(&self, request: MonitorRequest) {
        if let Err(e) = put_json(
            self.inner.store.as_ref(),
            &keys::pending(&request.workflow_id),
            &PendingWorkflow::Monitor(request.clone()),
        )
        .await
        {
            warn!(workflow_id = %request.workflow_id, "Failed to persist pending monitor: {}", e);
        }
        launch_monitor(self.inner.clone(), request);
    }

    /// Spawn the deployment workflow for one load balancer.
    ///
    /// Preconditions fail here, before anything is spawned or called:
    /// missing platform credentials and unknown names are immediate
    /// errors to the caller.
    pub async fn spawn_deploy(&self, name: &str) -> Result<String> {
        if !self.inner.platform.is_configured() {
            return Err(EdgelbError::Auth(
                "edge platform credentials are not configured".into(),
            ));
        }
        let not_found = || {
            EdgelbError::NotFound(format!("load balancer '{}' is not registered", name))
        };
        // Unknown names must not materialize an actor.
        let handle = self
            .inner
            .directory
            .lookup(name)
            .await?
            .ok_or_else(not_found)?;
        if handle.get_config().await?.is_none() {
            return Err(not_found());
        }

        let input = DeployInput {
            workflow_id: format!("deploy-{}", Uuid::new_v4()),
            load_balancer_name: name.to_string(),
        };
        put_json(
            self.inner.store.as_ref(),
            &keys::pending(&input.workflow_id),
            &PendingWorkflow::Deploy(input.clone()),
        )
        .await?;
        handle
            .track_workflow(&input.workflow_id, deploy::STEP_CHECK_EXISTS)
            .await?;

        let workflow_id = input.workflow_id.clone();
        launch_deploy(self.inner.clone(), input);
        Ok(workflow_id)
    }

    /// Re-spawn every workflow whose pending record survived a restart.
    pub async fn resume_pending(&self) -> Result<usize> {
        let entries = self.inner.store.list_prefix(keys::PENDING_PREFIX).await?;
        let mut resumed = 0;
        for (key, value) in entries {
            match serde_json::from_value::<PendingWorkflow>(value) {
                Ok(PendingWorkflow::Monitor(request)) => {
                    launch_monitor(self.inner.clone(), request);
                    resumed += 1;
                }
                Ok(PendingWorkflow::Deploy(input)) => {
                    launch_deploy(self.inner.clone(), input);
                    resumed += 1;
                }
                Err(e) => {
                    warn!(key, "Dropping undecodable pending workflow: {}", e);
                    let _ = self.inner.store.delete(&key).await;
                }
            }
        }
        if resumed > 0 {
            info!(resumed, "Resumed pending workflows");
        }
        Ok(resumed)
    }

    /// Latest observed progress of a workflow, by id.
    pub fn status(&self, workflow_id: &str) -> Option<WorkflowStatusEvent> {
        self.inner
            .statuses
            .get(workflow_id)
            .map(|e| e.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> Arc<LauncherInner> {
        self.inner.clone()
    }
}

fn launch_monitor(inner: Arc<LauncherInner>, request: MonitorRequest) {
    tokio::spawn(async move {
        match monitor::run(&inner, &request).await {
            Ok(result) => {
                debug!(
                    workflow_id = %request.workflow_id,
                    host = %request.host,
                    is_healthy = result.is_healthy,
                    "Monitor workflow finished"
                );
            }
            Err(e) => {
                warn!(
                    workflow_id = %request.workflow_id,
                    host = %request.host,
                    "Monitor workflow failed: {}", e
                );
            }
        }
        // Terminal either way: nothing revisits this id, so its
        // checkpoints and pending record must not outlive the run.
        let _ = inner.checkpoints.clear(&request.workflow_id).await;
        let _ = inner.store.delete(&keys::pending(&request.workflow_id)).await;
    });
}

fn launch_deploy(inner: Arc<LauncherInner>, input: DeployInput) {
    tokio::spawn(async move {
        match deploy::run(&inner, &input).await {
            Ok(artifact) => {
                info!(
                    workflow_id = %input.workflow_id,
                    load_balancer = %input.load_balancer_name,
                    artifact = %artifact,
                    "Deployment workflow completed"
                );
            }
            Err(e) => {
                warn!(
                    workflow_id = %input.workflow_id,
                    load_balancer = %input.load_balancer_name,
                    "Deployment workflow failed: {}", e
                );
            }
        }
        let _ = inner.checkpoints.clear(&input.workflow_id).await;
        let _ = inner.store.delete(&keys::pending(&input.workflow_id)).await;
    });
}

/// Probe step: 2 attempts, backoff from ~5s.
pub(crate) fn probe_policy() -> edgelb_workflow::RetryPolicy {
    edgelb_workflow::RetryPolicy::new()
        .with_maximum_attempts(2)
        .with_initial_interval(Duration::from_secs(5))
}

/// Health delivery step: 3 attempts, backoff from ~2s.
pub(crate) fn update_policy() -> edgelb_workflow::RetryPolicy {
    edgelb_workflow::RetryPolicy::new()
        .with_maximum_attempts(3)
        .with_initial_interval(Duration::from_secs(2))
}

/// Deployment steps: per-step attempt limits over a common backoff.
pub(crate) fn deploy_policy(attempts: u32) -> edgelb_workflow::RetryPolicy {
    edgelb_workflow::RetryPolicy::new()
        .with_maximum_attempts(attempts)
        .with_initial_interval(Duration::from_secs(1))
        .with_maximum_interval(Duration::from_secs(30))
}
