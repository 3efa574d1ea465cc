//! Edge execution platform REST client
//!
//! The platform hosts the published routing artifacts and one shared,
//! account-wide rule list. The rule list is the only shared mutable
//! resource in the system: updating it is a read-modify-write with no
//! external locking, so concurrent deployments for different load
//! balancers can race (accepted limitation).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use edgelb_core::{EdgelbError, Result};

/// One routing rule on the platform. `artifact` carries the sanitized
/// artifact name and marks which load balancer owns the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub expression: String,
    pub artifact: String,
    pub description: String,
}

#[async_trait]
pub trait EdgePlatform: Send + Sync + 'static {
    /// Credentials present? Deployment fails fast before any call if not.
    fn is_configured(&self) -> bool;

    async fn artifact_exists(&self, name: &str) -> Result<bool>;

    /// Create-or-replace; idempotent at the target.
    async fn publish_artifact(&self, name: &str, source: &str) -> Result<()>;

    async fn get_rules(&self) -> Result<Vec<RoutingRule>>;

    async fn put_rules(&self, rules: Vec<RoutingRule>) -> Result<()>;
}

/// HTTP implementation against the platform's account-scoped REST API.
pub struct HttpEdgePlatform {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    api_token: Option<String>,
}

impl HttpEdgePlatform {
    pub fn new(base_url: &str, account_id: &str, api_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id: account_id.to_string(),
            api_token,
        }
    }

    fn artifact_url(&self, name: &str) -> String {
        format!(
            "{}/accounts/{}/artifacts/{}",
            self.base_url, self.account_id, name
        )
    }

    fn rules_url(&self) -> String {
        format!("{}/accounts/{}/rules", self.base_url, self.account_id)
    }

    fn token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| EdgelbError::Auth("edge platform API token not configured".into()))
    }
}

#[async_trait]
impl EdgePlatform for HttpEdgePlatform {
    fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    async fn artifact_exists(&self, name: &str) -> Result<bool> {
        let token = self.token()?;
        let response = self
            .http
            .get(self.artifact_url(name))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| EdgelbError::Network(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(EdgelbError::Network(format!(
                "artifact lookup for '{}' returned {}",
                name, status
            ))),
        }
    }

    async fn publish_artifact(&self, name: &str, source: &str) -> Result<()> {
        let token = self.token()?;
        let response = self
            .http
            .put(self.artifact_url(name))
            .bearer_auth(token)
            .header("content-type", "application/javascript")
            .body(source.to_string())
            .send()
            .await
            .map_err(|e| EdgelbError::Network(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EdgelbError::Network(format!(
                "artifact publish for '{}' returned {}",
                name,
                response.status()
            )))
        }
    }

    async fn get_rules(&self) -> Result<Vec<RoutingRule>> {
        let token = self.token()?;
        let response = self
            .http
            .get(self.rules_url())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| EdgelbError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EdgelbError::Network(format!(
                "rule list fetch returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| EdgelbError::Serialization(e.to_string()))
    }

    async fn put_rules(&self, rules: Vec<RoutingRule>) -> Result<()> {
        let token = self.token()?;
        let response = self
            .http
            .put(self.rules_url())
            .bearer_auth(token)
            .json(&rules)
            .send()
            .await
            .map_err(|e| EdgelbError::Network(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EdgelbError::Network(format!(
                "rule list update returned {}",
                response.status()
            )))
        }
    }
}
