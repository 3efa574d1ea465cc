//! Load balancer domain types
//!
//! A `LoadBalancerConfig` is an immutable snapshot: register replaces the
//! whole config, it is never patched field by field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EdgelbError, Result};

/// Named load balancer definition: backends, probe policy and routing match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    /// Unique name, stable key for actor addressing
    pub name: String,
    /// Ordered backend addresses; duplicates permitted, order is routing input only
    pub hosts: Vec<String>,
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub routing: RoutingExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    /// Seconds between probe cycles, must be > 0
    #[serde(rename = "probeInterval")]
    pub probe_interval_secs: u64,
    pub probe_path: String,
}

/// Routing match expression; absent conditions are omitted, an all-absent
/// expression matches unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingExpression {
    pub hostname: Option<String>,
    pub path: Option<String>,
}

impl LoadBalancerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EdgelbError::Validation("name must not be empty".into()));
        }
        if self.health_check.probe_interval_secs == 0 {
            return Err(EdgelbError::Validation(
                "healthCheck.probeInterval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Name under which the routing artifact is published on the edge
    /// platform: lowercase, anything outside `[a-z0-9_]` becomes `_`.
    pub fn sanitized_artifact_name(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl RoutingExpression {
    /// Render the edge rule match expression. Hostname and path conditions
    /// are ANDed; with neither present the rule matches everything.
    pub fn to_match_expression(&self) -> String {
        let mut parts = Vec::new();
        if let Some(hostname) = &self.hostname {
            parts.push(format!("http.host == \"{}\"", hostname));
        }
        if let Some(path) = &self.path {
            parts.push(format!("starts_with(http.request.path, \"{}\")", path));
        }
        if parts.is_empty() {
            "true".to_string()
        } else {
            parts.join(" and ")
        }
    }
}

/// Last known probe outcome for one `(loadBalancerName, host)` pair.
/// Records exist only for hosts present in the owning config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub is_healthy: bool,
    pub last_checked: DateTime<Utc>,
    pub next_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_workflow_id: Option<String>,
}

/// Tracking entry for the in-flight deployment of one load balancer.
/// A newer deployment overwrites the entry without cancelling the older
/// workflow execution; removal is implicit on terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWorkflowRecord {
    pub workflow_id: String,
    pub current_step: String,
}

/// One entry of the aggregate listing: the config merged with per-host
/// health. Hosts without a record are omitted, never fabricated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerListing {
    #[serde(flatten)]
    pub config: LoadBalancerConfig,
    pub health_status: HashMap<String, HealthRecord>,
}
