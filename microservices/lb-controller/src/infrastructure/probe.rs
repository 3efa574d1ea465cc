//! Outbound health probe client
//!
//! One probe is a pure function of (host, path): a GET with a short timeout
//! whose outcome is always a health result. Connection failures and
//! timeouts are expected outcomes, converted to unhealthy, never raised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of one probe against one backend host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub host: String,
    pub is_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
}

impl ProbeClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Probe `host + path`. Healthy means an HTTP status below 400.
    pub async fn probe(&self, host: &str, path: &str) -> ProbeResult {
        let url = Self::probe_url(host, path);
        let start = Instant::now();
        let checked_at = Utc::now();

        let (is_healthy, status_code) = match self.http.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                (status < 400, Some(status))
            }
            Err(err) => {
                debug!(host, "Probe connection failed: {}", err);
                (false, None)
            }
        };

        ProbeResult {
            host: host.to_string(),
            is_healthy,
            status_code,
            latency_ms: start.elapsed().as_millis() as u64,
            checked_at,
        }
    }

    fn probe_url(host: &str, path: &str) -> String {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        let base = base.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}
