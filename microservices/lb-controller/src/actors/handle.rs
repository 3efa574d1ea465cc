//! Handle for communicating with a load balancer actor
//!
//! Cheap to clone: just the name and the mailbox sender.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use edgelb_core::{
    EdgelbError, HealthRecord, LoadBalancerConfig, LoadBalancerListing, ObserverEvent, Result,
    WorkflowStatusEvent,
};

use super::command::LbCommand;

#[derive(Clone)]
pub struct LbActorHandle {
    name: String,
    tx: mpsc::Sender<LbCommand>,
}

impl LbActorHandle {
    pub(super) fn new(name: String, tx: mpsc::Sender<LbCommand>) -> Self {
        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn gone(&self) -> EdgelbError {
        EdgelbError::Unavailable(format!("load balancer actor '{}' is not running", self.name))
    }

    async fn send(&self, command: LbCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| self.gone())
    }

    pub async fn set_config(&self, config: LoadBalancerConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(LbCommand::SetConfig { config, reply }).await?;
        rx.await.map_err(|_| self.gone())?
    }

    pub async fn get_config(&self) -> Result<Option<LoadBalancerConfig>> {
        let (reply, rx) = oneshot::channel();
        self.send(LbCommand::GetConfig { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn health_snapshot(&self) -> Result<HashMap<String, HealthRecord>> {
        let (reply, rx) = oneshot::channel();
        self.send(LbCommand::HealthSnapshot { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn apply_health_update(
        &self,
        host: &str,
        is_healthy: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(LbCommand::ApplyHealthUpdate {
            host: host.to_string(),
            is_healthy,
            checked_at,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.gone())?
    }

    pub async fn track_workflow(&self, workflow_id: &str, current_step: &str) -> Result<()> {
        self.send(LbCommand::TrackWorkflow {
            workflow_id: workflow_id.to_string(),
            current_step: current_step.to_string(),
        })
        .await
    }

    pub async fn update_workflow_step(&self, event: WorkflowStatusEvent) -> Result<()> {
        self.send(LbCommand::UpdateWorkflowStep { event }).await
    }

    pub async fn attach_session(&self) -> Result<(Uuid, mpsc::UnboundedReceiver<ObserverEvent>)> {
        let (reply, rx) = oneshot::channel();
        self.send(LbCommand::AttachSession { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn detach_session(&self, session_id: Uuid) {
        let _ = self.send(LbCommand::DetachSession { session_id }).await;
    }

    pub async fn broadcast_list(&self, load_balancers: Vec<LoadBalancerListing>) -> Result<()> {
        self.send(LbCommand::BroadcastList { load_balancers }).await
    }

    pub async fn delete_all(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(LbCommand::DeleteAll { reply }).await?;
        rx.await.map_err(|_| self.gone())?
    }

    /// Deliver the recurring-timer signal directly. The actor's own timer
    /// task uses the mailbox for this; exposed for manual cycles.
    pub async fn fire_timer(&self) -> Result<()> {
        self.send(LbCommand::TimerFired).await
    }
}
