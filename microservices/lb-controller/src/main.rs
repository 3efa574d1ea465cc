//! Load Balancer Controller
//!
//! Control plane for edge load balancers:
//! - Registers named load balancer definitions
//! - Continuously monitors backend health via per-name actors with
//!   durable recurring timers
//! - Drives the durable deployment workflow that publishes routing
//!   artifacts to the edge execution platform
//! - Multicasts live state changes to attached observers

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

use edgelb_core::{
    DependencyStatus, EdgelbService, HealthStatus, MicroserviceRuntime, ReadinessStatus, Result,
};

mod actors;
mod api;
mod config;
mod infrastructure;
mod workflows;

use actors::{ActorDirectory, RegistryActor};
use api::AppState;
use config::ControllerConfig;
use infrastructure::{DurableStore, FileStore, HttpEdgePlatform, ProbeClient};
use workflows::WorkflowLauncher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lb_controller=debug".parse().unwrap()),
        )
        .json()
        .init();

    info!("Starting Load Balancer Controller");

    let service = Arc::new(LbControllerService::new().await?);
    MicroserviceRuntime::run(service).await
}

pub struct LbControllerService {
    config: ControllerConfig,
    state: AppState,
    start_time: Instant,
}

impl LbControllerService {
    pub async fn new() -> Result<Self> {
        let config = ControllerConfig::from_env()?;

        let store: Arc<dyn DurableStore> = Arc::new(FileStore::open(&config.data_dir)?);
        let platform = Arc::new(HttpEdgePlatform::new(
            &config.edge_api_url,
            &config.edge_account_id,
            config.edge_api_token.clone(),
        ));
        let probe = ProbeClient::new(Duration::from_secs(config.probe_timeout_secs));

        let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
        let directory = Arc::new(ActorDirectory::new(store.clone(), monitor_tx));
        let launcher = WorkflowLauncher::new(
            store.clone(),
            directory.clone(),
            platform.clone(),
            probe,
        );
        launcher.listen(monitor_rx);

        // Cold start: the registry replays stored configs into their
        // actors, then any workflow interrupted mid-execution resumes.
        let registry = RegistryActor::spawn(store, directory.clone());
        launcher.resume_pending().await?;

        let platform_configured = config.edge_api_token.is_some();
        let state = AppState {
            registry,
            directory,
            launcher,
            platform_configured,
            started_at: Instant::now(),
        };

        Ok(Self {
            config,
            state,
            start_time: Instant::now(),
        })
    }
}

#[async_trait::async_trait]
impl EdgelbService for LbControllerService {
    fn service_id(&self) -> &'static str {
        "lb-controller"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        ReadinessStatus {
            ready: true,
            dependencies: vec![
                DependencyStatus {
                    name: "durable-store".to_string(),
                    available: true,
                },
                DependencyStatus {
                    name: "edge-platform-credentials".to_string(),
                    available: self.state.platform_configured,
                },
            ],
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Controller shutting down");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let app = api::rest::router(self.state.clone());
        let addr = format!("0.0.0.0:{}", self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %addr, "HTTP API listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| edgelb_core::EdgelbError::Internal(e.to_string()))
    }
}
