//! Observer event taxonomy
//!
//! Events multicast to attached observer sessions. Sending is best-effort:
//! a failed send means the session is gone and it is evicted, the send is
//! never retried and no error reaches the caller that triggered it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{HealthRecord, LoadBalancerConfig, LoadBalancerListing};

/// Server-to-observer messages pushed over the live channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObserverEvent {
    /// Baseline snapshot pushed immediately on attach, before any live update
    #[serde(rename_all = "camelCase")]
    InitialHealthStatus {
        load_balancer_name: String,
        health_status: HashMap<String, HealthRecord>,
    },
    #[serde(rename_all = "camelCase")]
    HealthStatusUpdate {
        load_balancer_name: String,
        health_status: HashMap<String, HealthRecord>,
    },
    #[serde(rename_all = "camelCase")]
    ConfigUpdate {
        load_balancer_name: String,
        config: LoadBalancerConfig,
    },
    WorkflowStatus(WorkflowStatusEvent),
    /// Aggregate listing broadcast through the well-known default instance,
    /// e.g. after a delete, so observers there see the new list
    #[serde(rename_all = "camelCase")]
    LoadBalancerList {
        load_balancers: Vec<LoadBalancerListing>,
    },
}

/// Step-by-step progress of a deployment workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusEvent {
    pub workflow_id: String,
    pub load_balancer_name: String,
    pub completed: bool,
    pub success: bool,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags() {
        let event = ObserverEvent::InitialHealthStatus {
            load_balancer_name: "lb1".into(),
            health_status: HashMap::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "initialHealthStatus");
        assert_eq!(json["loadBalancerName"], "lb1");

        let event = ObserverEvent::WorkflowStatus(WorkflowStatusEvent {
            workflow_id: "deploy-1".into(),
            load_balancer_name: "lb1".into(),
            completed: true,
            success: false,
            current_step: "deploy-artifact".into(),
            error: Some("boom".into()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "workflowStatus");
        assert_eq!(json["currentStep"], "deploy-artifact");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_error_omitted_when_absent() {
        let event = WorkflowStatusEvent {
            workflow_id: "deploy-1".into(),
            load_balancer_name: "lb1".into(),
            completed: false,
            success: true,
            current_step: "check-artifact-exists".into(),
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("error").is_none());
    }
}
