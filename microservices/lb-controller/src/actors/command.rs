//! Commands for the load balancer actor

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use edgelb_core::{
    HealthRecord, LoadBalancerConfig, LoadBalancerListing, ObserverEvent, Result,
    WorkflowStatusEvent,
};

/// Commands for a single load balancer's actor
pub enum LbCommand {
    // === Configuration ===
    SetConfig {
        config: LoadBalancerConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    GetConfig {
        reply: oneshot::Sender<Option<LoadBalancerConfig>>,
    },

    // === Health ===
    HealthSnapshot {
        reply: oneshot::Sender<HashMap<String, HealthRecord>>,
    },
    ApplyHealthUpdate {
        host: String,
        is_healthy: bool,
        checked_at: DateTime<Utc>,
        reply: oneshot::Sender<Result<()>>,
    },

    // === Workflow tracking ===
    TrackWorkflow {
        workflow_id: String,
        current_step: String,
    },
    UpdateWorkflowStep {
        event: WorkflowStatusEvent,
    },

    // === Observer sessions ===
    AttachSession {
        reply: oneshot::Sender<(Uuid, mpsc::UnboundedReceiver<ObserverEvent>)>,
    },
    DetachSession {
        session_id: Uuid,
    },
    BroadcastList {
        load_balancers: Vec<LoadBalancerListing>,
    },

    // === Lifecycle ===
    TimerFired,
    DeleteAll {
        reply: oneshot::Sender<Result<()>>,
    },
}
