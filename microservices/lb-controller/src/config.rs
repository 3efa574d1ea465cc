//! Controller configuration

use edgelb_core::{EdgelbError, Result};
use std::env;
use std::path::PathBuf;

/// Name of the well-known default actor instance used as the sink for
/// aggregate broadcasts (e.g. the updated listing after a delete).
pub const DEFAULT_ACTOR: &str = "default";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub http_port: u16,
    /// Directory backing the durable store
    pub data_dir: PathBuf,
    /// Per-probe request timeout, seconds
    pub probe_timeout_secs: u64,
    /// Base URL of the edge execution platform REST API
    pub edge_api_url: String,
    pub edge_account_id: String,
    /// API token; absence is the deploy precondition failure, not a startup error
    pub edge_api_token: Option<String>,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|e| EdgelbError::Config(format!("Invalid HTTP_PORT: {}", e)))?,
            data_dir: env::var("EDGELB_DATA_DIR")
                .unwrap_or_else(|_| "/var/lib/edgelb".to_string())
                .into(),
            probe_timeout_secs: env::var("EDGELB_PROBE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|e| {
                    EdgelbError::Config(format!("Invalid EDGELB_PROBE_TIMEOUT_SECS: {}", e))
                })?,
            edge_api_url: env::var("EDGE_API_URL")
                .unwrap_or_else(|_| "https://api.edge-platform.example".to_string()),
            edge_account_id: env::var("EDGE_ACCOUNT_ID").unwrap_or_else(|_| "default".to_string()),
            edge_api_token: env::var("EDGE_API_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }
}
