use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use edgelb_core::{
    EdgelbError, HealthCheckConfig, LoadBalancerConfig, ObserverEvent, Result, RoutingExpression,
};

use crate::actors::ActorDirectory;
use crate::infrastructure::storage::{keys, put_json, DurableStore, MemoryStore};
use crate::infrastructure::{EdgePlatform, ProbeClient, RoutingRule};

use super::{deploy, monitor, DeployInput, MonitorRequest, PendingWorkflow, WorkflowLauncher};

/// In-memory edge platform with injectable publish failures.
#[derive(Default)]
struct MockPlatform {
    configured: bool,
    artifacts: Mutex<HashMap<String, String>>,
    rules: Mutex<Vec<RoutingRule>>,
    exists_calls: AtomicU32,
    publish_failures: AtomicU32,
    publish_denied: AtomicBool,
}

impl MockPlatform {
    fn configured() -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            ..Self::default()
        })
    }

    fn unconfigured() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl EdgePlatform for MockPlatform {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn artifact_exists(&self, name: &str) -> Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.artifacts.lock().contains_key(name))
    }

    async fn publish_artifact(&self, name: &str, source: &str) -> Result<()> {
        if self.publish_denied.load(Ordering::SeqCst) {
            return Err(EdgelbError::Auth("token rejected".into()));
        }
        if self.publish_failures.load(Ordering::SeqCst) > 0 {
            self.publish_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(EdgelbError::Network("edge api is down".into()));
        }
        self.artifacts
            .lock()
            .insert(name.to_string(), source.to_string());
        Ok(())
    }

    async fn get_rules(&self) -> Result<Vec<RoutingRule>> {
        Ok(self.rules.lock().clone())
    }

    async fn put_rules(&self, rules: Vec<RoutingRule>) -> Result<()> {
        *self.rules.lock() = rules;
        Ok(())
    }
}

fn config(name: &str, hosts: &[&str]) -> LoadBalancerConfig {
    LoadBalancerConfig {
        name: name.to_string(),
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
        health_check: HealthCheckConfig {
            probe_interval_secs: 30,
            probe_path: "/healthz".to_string(),
        },
        routing: RoutingExpression {
            hostname: Some("app.example.com".into()),
            path: None,
        },
    }
}

fn setup(
    platform: Arc<MockPlatform>,
) -> (
    Arc<dyn DurableStore>,
    Arc<ActorDirectory>,
    WorkflowLauncher,
    mpsc::UnboundedReceiver<MonitorRequest>,
) {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
    let directory = Arc::new(ActorDirectory::new(store.clone(), monitor_tx));
    let launcher = WorkflowLauncher::new(
        store.clone(),
        directory.clone(),
        platform,
        ProbeClient::new(Duration::from_millis(500)),
    );
    (store, directory, launcher, monitor_rx)
}

async fn local_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    let app = axum::Router::new().route("/healthz", axum::routing::get(|| async { "ok" }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    host
}

#[tokio::test]
async fn test_monitor_workflow_delivers_probe_result() {
    let (_store, directory, launcher, _monitor_rx) = setup(MockPlatform::configured());
    let host = local_backend().await;

    let handle = directory.get("lb1");
    handle.set_config(config("lb1", &[&host])).await.unwrap();

    let request = MonitorRequest {
        workflow_id: "monitor-t1".to_string(),
        load_balancer_name: "lb1".to_string(),
        host: host.clone(),
        probe_path: "/healthz".to_string(),
    };
    let result = monitor::run(&launcher.inner(), &request).await.unwrap();
    assert!(result.is_healthy);
    assert_eq!(result.status_code, Some(200));

    let snapshot = handle.health_snapshot().await.unwrap();
    let record = &snapshot[&host];
    assert!(record.is_healthy);
    assert_eq!(
        record.next_check,
        record.last_checked + chrono::Duration::seconds(30)
    );
}

#[tokio::test]
async fn test_monitor_records_unreachable_backend_as_unhealthy() {
    let (_store, directory, launcher, _monitor_rx) = setup(MockPlatform::configured());

    let handle = directory.get("lb1");
    handle.set_config(config("lb1", &["127.0.0.1:1"])).await.unwrap();

    let request = MonitorRequest {
        workflow_id: "monitor-t2".to_string(),
        load_balancer_name: "lb1".to_string(),
        host: "127.0.0.1:1".to_string(),
        probe_path: "/healthz".to_string(),
    };
    let result = monitor::run(&launcher.inner(), &request).await.unwrap();
    assert!(!result.is_healthy);
    assert!(result.status_code.is_none());

    let snapshot = handle.health_snapshot().await.unwrap();
    assert!(!snapshot["127.0.0.1:1"].is_healthy);
}

#[tokio::test]
async fn test_spawn_deploy_publishes_and_swaps_own_rule() {
    let platform = MockPlatform::configured();
    platform.rules.lock().extend([
        RoutingRule {
            expression: "true".into(),
            artifact: "lb1".into(),
            description: "stale rule".into(),
        },
        RoutingRule {
            expression: "true".into(),
            artifact: "other_lb".into(),
            description: "unrelated".into(),
        },
    ]);
    let (store, directory, launcher, _monitor_rx) = setup(platform.clone());

    let handle = directory.get("lb1");
    let cfg = config("lb1", &["h1", "h2"]);
    handle.set_config(cfg).await.unwrap();

    let workflow_id = launcher.spawn_deploy("lb1").await.unwrap();
    assert!(workflow_id.starts_with("deploy-"));

    // The workflow runs detached; the pending record disappearing is the
    // terminal signal.
    let mut finished = false;
    for _ in 0..300 {
        if store.get(&keys::pending(&workflow_id)).await.unwrap().is_none() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(finished, "deployment never finished");

    let status = launcher.status(&workflow_id).unwrap();
    assert!(status.completed);
    assert!(status.success);
    assert_eq!(status.current_step, deploy::STEP_UPDATE_RULES);

    assert!(platform.artifacts.lock().contains_key("lb1"));
    let rules = platform.rules.lock().clone();
    assert_eq!(rules.len(), 2);
    let own = rules.iter().find(|r| r.artifact == "lb1").unwrap();
    assert_eq!(own.expression, "http.host == \"app.example.com\"");
    assert!(rules.iter().any(|r| r.description == "unrelated"));

    // Success clears the step checkpoints and the actor's tracking entry.
    assert!(store
        .list_prefix(&keys::checkpoint_prefix(&workflow_id))
        .await
        .unwrap()
        .is_empty());
    handle.health_snapshot().await.unwrap();
    assert!(store.get(&keys::lb_workflow("lb1")).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deploy_resumes_past_completed_steps() {
    let platform = MockPlatform::configured();
    platform.publish_failures.store(10, Ordering::SeqCst);
    let (_store, directory, launcher, _monitor_rx) = setup(platform.clone());

    directory
        .get("lb1")
        .set_config(config("lb1", &["h1"]))
        .await
        .unwrap();

    let input = DeployInput {
        workflow_id: "deploy-t1".to_string(),
        load_balancer_name: "lb1".to_string(),
    };

    let err = deploy::run(&launcher.inner(), &input).await.unwrap_err();
    let (step, message) = err.terminal_step().unwrap();
    assert_eq!(step, deploy::STEP_DEPLOY);
    assert!(message.contains("edge api is down"));
    assert_eq!(platform.exists_calls.load(Ordering::SeqCst), 1);

    let status = launcher.status("deploy-t1").unwrap();
    assert!(status.completed);
    assert!(!status.success);
    assert_eq!(status.current_step, deploy::STEP_DEPLOY);
    assert!(status.error.is_some());

    // Re-running the same workflow id after the outage skips the
    // checkpointed existence check and picks up at the failed step.
    platform.publish_failures.store(0, Ordering::SeqCst);
    let artifact = deploy::run(&launcher.inner(), &input).await.unwrap();
    assert_eq!(artifact, "lb1");
    assert_eq!(platform.exists_calls.load(Ordering::SeqCst), 1);
    assert!(launcher.status("deploy-t1").unwrap().success);
}

#[tokio::test]
async fn test_spawn_deploy_requires_credentials() {
    let platform = MockPlatform::unconfigured();
    let (store, directory, launcher, _monitor_rx) = setup(platform.clone());
    directory
        .get("lb1")
        .set_config(config("lb1", &["h1"]))
        .await
        .unwrap();

    let err = launcher.spawn_deploy("lb1").await.unwrap_err();
    assert_eq!(err.error_code(), "AUTH_ERROR");

    // Fails before anything is spawned or called.
    assert_eq!(platform.exists_calls.load(Ordering::SeqCst), 0);
    assert!(store.list_prefix(keys::PENDING_PREFIX).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_spawn_deploy_rejects_unknown_name() {
    let (_store, directory, launcher, _monitor_rx) = setup(MockPlatform::configured());
    let err = launcher.spawn_deploy("nope").await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
    // The bogus name must not have materialized an actor.
    assert_eq!(directory.actor_count(), 0);
}

#[tokio::test]
async fn test_terminal_failure_leaves_no_checkpoints_or_pending() {
    let platform = MockPlatform::configured();
    platform.publish_denied.store(true, Ordering::SeqCst);
    let (store, directory, launcher, _monitor_rx) = setup(platform);
    directory
        .get("lb1")
        .set_config(config("lb1", &["h1"]))
        .await
        .unwrap();

    let workflow_id = launcher.spawn_deploy("lb1").await.unwrap();

    let mut finished = false;
    for _ in 0..300 {
        if store.get(&keys::pending(&workflow_id)).await.unwrap().is_none() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(finished, "deployment never reached a terminal state");

    let status = launcher.status(&workflow_id).unwrap();
    assert!(status.completed);
    assert!(!status.success);
    assert_eq!(status.current_step, deploy::STEP_DEPLOY);

    // A permanently failed run is terminal too: its step checkpoints
    // must not pile up in the store behind an id nothing revisits.
    assert!(store
        .list_prefix(&keys::checkpoint_prefix(&workflow_id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_deploy_emits_progress_around_each_step() {
    let (_store, directory, launcher, _monitor_rx) = setup(MockPlatform::configured());
    let handle = directory.get("lb1");
    handle.set_config(config("lb1", &["h1"])).await.unwrap();

    let (_, mut events) = handle.attach_session().await.unwrap();
    while events.try_recv().is_ok() {}

    let input = DeployInput {
        workflow_id: "deploy-t2".to_string(),
        load_balancer_name: "lb1".to_string(),
    };
    deploy::run(&launcher.inner(), &input).await.unwrap();

    // Round-trip to flush the actor's mailbox before draining.
    handle.health_snapshot().await.unwrap();
    let mut steps = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ObserverEvent::WorkflowStatus(status) = event {
            steps.push((status.current_step.clone(), status.completed));
        }
    }
    assert_eq!(
        steps,
        vec![
            (deploy::STEP_CHECK_EXISTS.to_string(), false),
            (deploy::STEP_CHECK_EXISTS.to_string(), false),
            (deploy::STEP_DEPLOY.to_string(), false),
            (deploy::STEP_DEPLOY.to_string(), false),
            (deploy::STEP_UPDATE_RULES.to_string(), false),
            (deploy::STEP_UPDATE_RULES.to_string(), true),
        ]
    );
}

#[tokio::test]
async fn test_resume_pending_restarts_interrupted_deploy() {
    let platform = MockPlatform::configured();
    let (store, directory, launcher, _monitor_rx) = setup(platform.clone());
    directory
        .get("lb1")
        .set_config(config("lb1", &["h1"]))
        .await
        .unwrap();

    // A pending record with no running task is what a crash leaves behind.
    put_json(
        store.as_ref(),
        &keys::pending("deploy-resume"),
        &PendingWorkflow::Deploy(DeployInput {
            workflow_id: "deploy-resume".to_string(),
            load_balancer_name: "lb1".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(launcher.resume_pending().await.unwrap(), 1);

    let mut finished = false;
    for _ in 0..300 {
        if store.get(&keys::pending("deploy-resume")).await.unwrap().is_none() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(finished, "resumed deployment never finished");
    assert!(platform.artifacts.lock().contains_key("lb1"));
}

#[tokio::test]
async fn test_resume_pending_drops_undecodable_records() {
    let (store, _directory, launcher, _monitor_rx) = setup(MockPlatform::configured());
    store
        .put(&keys::pending("wf-junk"), serde_json::json!({"kind": "???"}))
        .await
        .unwrap();

    assert_eq!(launcher.resume_pending().await.unwrap(), 0);
    assert!(store.get(&keys::pending("wf-junk")).await.unwrap().is_none());
}

/// Full pipeline: the actor's timer requests monitors, the launcher runs
/// them, results land back in the actor's health table.
#[tokio::test]
async fn test_timer_cycle_feeds_health_table() {
    let (store, directory, launcher, monitor_rx) = setup(MockPlatform::configured());
    launcher.listen(monitor_rx);

    let good = local_backend().await;
    let handle = directory.get("lb1");
    handle
        .set_config(config("lb1", &[&good, "127.0.0.1:1"]))
        .await
        .unwrap();

    handle.fire_timer().await.unwrap();

    let mut snapshot = HashMap::new();
    for _ in 0..300 {
        snapshot = handle.health_snapshot().await.unwrap();
        if snapshot.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(snapshot.len(), 2, "probe cycle never completed");
    assert!(snapshot[&good].is_healthy);
    assert!(!snapshot["127.0.0.1:1"].is_healthy);

    // Finished monitors leave no pending records behind.
    for _ in 0..300 {
        if store.list_prefix(keys::PENDING_PREFIX).await.unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pending monitor records were not cleaned up");
}
