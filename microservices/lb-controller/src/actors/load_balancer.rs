//! Per-name load balancer actor
//!
//! Owns one load balancer's config snapshot, health table, deployment
//! tracking entry and durable recurring timer, and multicasts state
//! changes to attached observer sessions. State is persisted through the
//! durable store on every mutation so a restarted actor picks up where
//! the previous instance stopped.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use edgelb_core::{
    ActiveWorkflowRecord, HealthRecord, LoadBalancerConfig, LoadBalancerListing, ObserverEvent,
    Result, WorkflowStatusEvent,
};

use crate::infrastructure::storage::{get_json, keys, put_json, DurableStore};
use crate::workflows::MonitorRequest;

use super::command::LbCommand;
use super::handle::LbActorHandle;

const MAILBOX_CAPACITY: usize = 64;

/// Ephemeral observer attached to this actor; lives only as long as the
/// connection, never persisted.
struct ObserverSession {
    id: Uuid,
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

pub struct LbActor {
    name: String,
    store: Arc<dyn DurableStore>,
    monitor_tx: mpsc::UnboundedSender<MonitorRequest>,
    self_tx: mpsc::Sender<LbCommand>,

    config: Option<LoadBalancerConfig>,
    health: HashMap<String, HealthRecord>,
    active_workflow: Option<ActiveWorkflowRecord>,
    sessions: Vec<ObserverSession>,
    timer_task: Option<JoinHandle<()>>,
}

impl LbActor {
    /// Spawn the actor task for one name and return its handle. Persisted
    /// state (including a pending alarm) is reloaded before the mailbox is
    /// drained, so addressing an actor is enough to re-prime it.
    pub fn spawn(
        name: String,
        store: Arc<dyn DurableStore>,
        monitor_tx: mpsc::UnboundedSender<MonitorRequest>,
    ) -> LbActorHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = LbActorHandle::new(name.clone(), tx.clone());

        tokio::spawn(async move {
            match LbActor::load(name.clone(), store, monitor_tx, tx).await {
                Ok(actor) => actor.run(rx).await,
                Err(e) => error!(load_balancer = %name, "Failed to load actor state: {}", e),
            }
        });

        handle
    }

    async fn load(
        name: String,
        store: Arc<dyn DurableStore>,
        monitor_tx: mpsc::UnboundedSender<MonitorRequest>,
        self_tx: mpsc::Sender<LbCommand>,
    ) -> Result<Self> {
        let config: Option<LoadBalancerConfig> =
            get_json(store.as_ref(), &keys::lb_config(&name)).await?;
        let health: HashMap<String, HealthRecord> =
            get_json(store.as_ref(), &keys::lb_health(&name))
                .await?
                .unwrap_or_default();
        let active_workflow: Option<ActiveWorkflowRecord> =
            get_json(store.as_ref(), &keys::lb_workflow(&name)).await?;
        let alarm: Option<DateTime<Utc>> = get_json(store.as_ref(), &keys::alarm(&name)).await?;

        let mut actor = Self {
            name,
            store,
            monitor_tx,
            self_tx,
            config,
            health,
            active_workflow,
            sessions: Vec::new(),
            timer_task: None,
        };

        // A persisted alarm re-arms as-is: the wake-up survives restarts
        // without recomputing the schedule.
        if let Some(at) = alarm {
            actor.arm_at(at);
        }

        Ok(actor)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<LbCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle_command(command).await;
        }
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
    }

    async fn handle_command(&mut self, command: LbCommand) {
        match command {
            LbCommand::SetConfig { config, reply } => {
                let _ = reply.send(self.on_set_config(config).await);
            }
            LbCommand::GetConfig { reply } => {
                self.resume_monitoring_if_idle().await;
                let _ = reply.send(self.config.clone());
            }
            LbCommand::HealthSnapshot { reply } => {
                let _ = reply.send(self.health.clone());
            }
            LbCommand::ApplyHealthUpdate {
                host,
                is_healthy,
                checked_at,
                reply,
            } => {
                let _ = reply.send(self.on_health_update(host, is_healthy, checked_at).await);
            }
            LbCommand::TrackWorkflow {
                workflow_id,
                current_step,
            } => {
                self.on_track_workflow(workflow_id, current_step).await;
            }
            LbCommand::UpdateWorkflowStep { event } => {
                self.on_workflow_step(event).await;
            }
            LbCommand::AttachSession { reply } => {
                let _ = reply.send(self.on_attach());
            }
            LbCommand::DetachSession { session_id } => {
                self.sessions.retain(|s| s.id != session_id);
            }
            LbCommand::BroadcastList { load_balancers } => {
                self.multicast(ObserverEvent::LoadBalancerList { load_balancers });
            }
            LbCommand::TimerFired => {
                self.on_timer_fired().await;
            }
            LbCommand::DeleteAll { reply } => {
                let _ = reply.send(self.on_delete_all().await);
            }
        }
    }

    // === Configuration ===

    async fn on_set_config(&mut self, config: LoadBalancerConfig) -> Result<()> {
        // Keep records for hosts still present, drop the rest.
        self.health.retain(|host, _| config.hosts.contains(host));
        self.config = Some(config.clone());

        put_json(self.store.as_ref(), &keys::lb_config(&self.name), &config).await?;
        self.persist_health().await?;

        if self.timer_task.is_none() {
            self.arm_and_persist(
                Utc::now() + ChronoDuration::seconds(config.health_check.probe_interval_secs as i64),
            )
            .await;
        }

        self.multicast(ObserverEvent::ConfigUpdate {
            load_balancer_name: self.name.clone(),
            config,
        });
        self.multicast_health();
        Ok(())
    }

    /// Self-healing on read: a configured actor with no armed timer arms
    /// one, so monitoring resumes on first access after a restart.
    async fn resume_monitoring_if_idle(&mut self) {
        if self.timer_task.is_some() {
            return;
        }
        if let Some(config) = &self.config {
            let interval = config.health_check.probe_interval_secs as i64;
            self.arm_and_persist(Utc::now() + ChronoDuration::seconds(interval))
                .await;
        }
    }

    // === Health ===

    async fn on_health_update(
        &mut self,
        host: String,
        is_healthy: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        // Updates for hosts no longer configured (or arriving after a
        // delete) are tolerated and ignored.
        let Some(config) = &self.config else {
            return Ok(());
        };
        if !config.hosts.contains(&host) {
            debug!(
                load_balancer = %self.name,
                host, "Ignoring health update for unconfigured host"
            );
            return Ok(());
        }

        let next_check =
            checked_at + ChronoDuration::seconds(config.health_check.probe_interval_secs as i64);
        self.health
            .entry(host)
            .and_modify(|record| {
                record.is_healthy = is_healthy;
                record.last_checked = checked_at;
                record.next_check = next_check;
            })
            .or_insert(HealthRecord {
                is_healthy,
                last_checked: checked_at,
                next_check,
                monitor_workflow_id: None,
            });

        self.persist_health().await?;
        self.multicast_health();
        Ok(())
    }

    // === Timer ===

    async fn on_timer_fired(&mut self) {
        let Some(config) = self.config.clone() else {
            // Deleted while the wake-up was in flight.
            if let Some(task) = self.timer_task.take() {
                task.abort();
            }
            let _ = self.store.delete(&keys::alarm(&self.name)).await;
            return;
        };

        // Re-arm before spawning any work: if a spawn fails, the next
        // cycle must still be scheduled. Next fire is now + interval, not
        // previous fire + interval, so overload cannot compound drift.
        let next = Utc::now()
            + ChronoDuration::seconds(config.health_check.probe_interval_secs as i64);
        self.arm_and_persist(next).await;

        for host in &config.hosts {
            let workflow_id = format!("monitor-{}", Uuid::new_v4());
            // Record the id without touching the host's last known status.
            if let Some(record) = self.health.get_mut(host) {
                record.monitor_workflow_id = Some(workflow_id.clone());
            }
            let request = MonitorRequest {
                workflow_id,
                load_balancer_name: self.name.clone(),
                host: host.clone(),
                probe_path: config.health_check.probe_path.clone(),
            };
            if self.monitor_tx.send(request).is_err() {
                warn!(load_balancer = %self.name, "Workflow launcher is gone, dropping probe cycle");
                break;
            }
        }

        if let Err(e) = self.persist_health().await {
            warn!(load_balancer = %self.name, "Failed to persist monitor ids: {}", e);
        }
    }

    fn arm_at(&mut self, at: DateTime<Utc>) {
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        let tx = self.self_tx.clone();
        self.timer_task = Some(tokio::spawn(async move {
            let delay = (at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(delay).await;
            let _ = tx.send(LbCommand::TimerFired).await;
        }));
    }

    async fn arm_and_persist(&mut self, at: DateTime<Utc>) {
        if let Err(e) = put_json(self.store.as_ref(), &keys::alarm(&self.name), &at).await {
            warn!(load_balancer = %self.name, "Failed to persist alarm: {}", e);
        }
        self.arm_at(at);
    }

    // === Workflow tracking ===

    async fn on_track_workflow(&mut self, workflow_id: String, current_step: String) {
        let record = ActiveWorkflowRecord {
            workflow_id: workflow_id.clone(),
            current_step: current_step.clone(),
        };
        self.active_workflow = Some(record.clone());
        if let Err(e) =
            put_json(self.store.as_ref(), &keys::lb_workflow(&self.name), &record).await
        {
            warn!(load_balancer = %self.name, "Failed to persist workflow record: {}", e);
        }
        self.multicast(ObserverEvent::WorkflowStatus(WorkflowStatusEvent {
            workflow_id,
            load_balancer_name: self.name.clone(),
            completed: false,
            success: true,
            current_step,
            error: None,
        }));
    }

    async fn on_workflow_step(&mut self, event: WorkflowStatusEvent) {
        self.multicast(ObserverEvent::WorkflowStatus(event.clone()));

        let tracked = self
            .active_workflow
            .as_ref()
            .is_some_and(|record| record.workflow_id == event.workflow_id);
        if !tracked {
            // Progress of an overwritten deployment: observers still see
            // it, the tracking entry belongs to the newer workflow.
            return;
        }

        if event.completed {
            self.active_workflow = None;
            let _ = self.store.delete(&keys::lb_workflow(&self.name)).await;
            // Synthetic terminal event for observers that only watch by
            // load balancer name.
            self.multicast(ObserverEvent::WorkflowStatus(WorkflowStatusEvent {
                workflow_id: event.workflow_id,
                load_balancer_name: self.name.clone(),
                completed: true,
                success: event.success,
                current_step: "completed".to_string(),
                error: event.error,
            }));
        } else {
            let record = ActiveWorkflowRecord {
                workflow_id: event.workflow_id,
                current_step: event.current_step,
            };
            self.active_workflow = Some(record.clone());
            if let Err(e) =
                put_json(self.store.as_ref(), &keys::lb_workflow(&self.name), &record).await
            {
                warn!(load_balancer = %self.name, "Failed to persist workflow record: {}", e);
            }
        }
    }

    // === Observer sessions ===

    fn on_attach(&mut self) -> (Uuid, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        // Baseline snapshot goes into the channel before the session joins
        // the multicast set, so it is always delivered first.
        let _ = tx.send(ObserverEvent::InitialHealthStatus {
            load_balancer_name: self.name.clone(),
            health_status: self.health.clone(),
        });
        let id = Uuid::new_v4();
        self.sessions.push(ObserverSession { id, tx });
        (id, rx)
    }

    fn multicast(&mut self, event: ObserverEvent) {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.tx.send(event.clone()).is_ok());
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            debug!(load_balancer = %self.name, evicted, "Evicted dead observer sessions");
        }
    }

    fn multicast_health(&mut self) {
        self.multicast(ObserverEvent::HealthStatusUpdate {
            load_balancer_name: self.name.clone(),
            health_status: self.health.clone(),
        });
    }

    // === Lifecycle ===

    async fn on_delete_all(&mut self) -> Result<()> {
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        self.store.delete(&keys::alarm(&self.name)).await?;
        self.store.delete(&keys::lb_config(&self.name)).await?;
        self.store.delete(&keys::lb_health(&self.name)).await?;
        self.store.delete(&keys::lb_workflow(&self.name)).await?;
        self.config = None;
        self.health.clear();
        self.active_workflow = None;
        Ok(())
    }

    async fn persist_health(&self) -> Result<()> {
        put_json(self.store.as_ref(), &keys::lb_health(&self.name), &self.health).await
    }
}

/// Merge one config with its actor's health table: every configured host
/// that has a record appears, hosts without one are omitted.
pub fn merge_listing(
    config: LoadBalancerConfig,
    health: &HashMap<String, HealthRecord>,
) -> LoadBalancerListing {
    let health_status = config
        .hosts
        .iter()
        .filter_map(|host| health.get(host).map(|r| (host.clone(), r.clone())))
        .collect();
    LoadBalancerListing {
        config,
        health_status,
    }
}
