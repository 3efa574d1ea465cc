//! Deployment workflow: publish the routing artifact, update the rules
//!
//! Three checkpointed steps with per-step retry limits (3/5/3). Progress
//! is pushed through the owning actor around every step; exhausting any
//! step's retries reports a terminal failure carrying the step name and
//! does not proceed further.
//!
//! Step 3 is a read-modify-write against the platform's shared rule list
//! with no external locking; concurrent deployments for different load
//! balancers can race there (accepted limitation).

use serde::{Deserialize, Serialize};
use tracing::debug;

use edgelb_core::{EdgelbError, LoadBalancerConfig, WorkflowStatusEvent};
use edgelb_workflow::{WorkflowError, WorkflowRun};

use crate::actors::LbActorHandle;
use crate::infrastructure::artifact::render_artifact;
use crate::infrastructure::RoutingRule;

use super::{deploy_policy, LauncherInner};

pub const STEP_CHECK_EXISTS: &str = "check-artifact-exists";
pub const STEP_DEPLOY: &str = "deploy-artifact";
pub const STEP_UPDATE_RULES: &str = "update-routing-rules";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployInput {
    pub workflow_id: String,
    pub load_balancer_name: String,
}

pub(crate) async fn run(ctx: &LauncherInner, input: &DeployInput) -> Result<String, WorkflowError> {
    let handle = ctx.directory.get(&input.load_balancer_name);

    let result = execute(ctx, &handle, input).await;
    match &result {
        Ok(artifact) => {
            emit(ctx, &handle, input, STEP_UPDATE_RULES, true, true, None).await;
            debug!(workflow_id = %input.workflow_id, artifact = %artifact, "Deployment succeeded");
        }
        Err(e) => {
            let (step, message) = e
                .terminal_step()
                .map(|(s, m)| (s.to_string(), m.to_string()))
                .unwrap_or_else(|| (STEP_CHECK_EXISTS.to_string(), e.to_string()));
            emit(ctx, &handle, input, &step, true, false, Some(message)).await;
        }
    }
    result
}

async fn execute(
    ctx: &LauncherInner,
    handle: &LbActorHandle,
    input: &DeployInput,
) -> Result<String, WorkflowError> {
    // The actor's config snapshot drives the whole deployment.
    let config = handle
        .get_config()
        .await
        .map_err(|e| WorkflowError::Delivery(e.to_string()))?
        .ok_or_else(|| WorkflowError::StepFailed {
            step: STEP_CHECK_EXISTS.to_string(),
            message: format!(
                "load balancer '{}' has no configuration",
                input.load_balancer_name
            ),
        })?;
    let artifact_name = config.sanitized_artifact_name();

    let run = WorkflowRun::new(input.workflow_id.clone(), ctx.checkpoint_store());

    // Step 1: read-only existence check, safe to retry freely.
    emit(ctx, handle, input, STEP_CHECK_EXISTS, false, true, None).await;
    let platform = ctx.platform.clone();
    let name = artifact_name.clone();
    let exists: bool = run
        .step(STEP_CHECK_EXISTS, &deploy_policy(3), || {
            let platform = platform.clone();
            let name = name.clone();
            async move { platform.artifact_exists(&name).await.map_err(map_platform) }
        })
        .await?;
    emit(ctx, handle, input, STEP_CHECK_EXISTS, false, true, None).await;
    debug!(
        workflow_id = %input.workflow_id,
        artifact = %artifact_name,
        exists,
        "Artifact will be {}", if exists { "replaced" } else { "created" }
    );

    // Step 2: create-or-replace is idempotent at the target, so re-running
    // after a partial success is safe.
    emit(ctx, handle, input, STEP_DEPLOY, false, true, None).await;
    let source = render_artifact(&config);
    let platform = ctx.platform.clone();
    let name = artifact_name.clone();
    let deployed: String = run
        .step(STEP_DEPLOY, &deploy_policy(5), || {
            let platform = platform.clone();
            let name = name.clone();
            let source = source.clone();
            async move {
                platform
                    .publish_artifact(&name, &source)
                    .await
                    .map_err(map_platform)?;
                Ok(name)
            }
        })
        .await?;
    emit(ctx, handle, input, STEP_DEPLOY, false, true, None).await;

    // Step 3: swap this load balancer's rule inside the shared rule list.
    emit(ctx, handle, input, STEP_UPDATE_RULES, false, true, None).await;
    let platform = ctx.platform.clone();
    let rule = build_rule(&config, &artifact_name);
    run.step::<(), _, _>(STEP_UPDATE_RULES, &deploy_policy(3), || {
        let platform = platform.clone();
        let rule = rule.clone();
        async move {
            let mut rules = platform.get_rules().await.map_err(map_platform)?;
            rules.retain(|r| r.artifact != rule.artifact);
            rules.push(rule);
            platform.put_rules(rules).await.map_err(map_platform)
        }
    })
    .await?;

    Ok(deployed)
}

fn build_rule(config: &LoadBalancerConfig, artifact_name: &str) -> RoutingRule {
    RoutingRule {
        expression: config.routing.to_match_expression(),
        artifact: artifact_name.to_string(),
        description: format!("edgelb route for {}", config.name),
    }
}

fn map_platform(err: EdgelbError) -> WorkflowError {
    match err {
        // Missing credentials are a precondition, never retried.
        EdgelbError::Auth(message) => WorkflowError::Precondition(message),
        other => WorkflowError::Activity(other.to_string()),
    }
}

async fn emit(
    ctx: &LauncherInner,
    handle: &LbActorHandle,
    input: &DeployInput,
    step: &str,
    completed: bool,
    success: bool,
    error: Option<String>,
) {
    let event = WorkflowStatusEvent {
        workflow_id: input.workflow_id.clone(),
        load_balancer_name: input.load_balancer_name.clone(),
        completed,
        success,
        current_step: step.to_string(),
        error,
    };
    ctx.statuses.insert(event.workflow_id.clone(), event.clone());
    let _ = handle.update_workflow_step(event).await;
}
