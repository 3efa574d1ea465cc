//! Monitor workflow: probe one endpoint, deliver the result
//!
//! Two checkpointed steps. A connection-level probe failure is an
//! expected outcome recorded as unhealthy, not an error; retries on the
//! second step only protect delivery to the actor.

use edgelb_workflow::{WorkflowError, WorkflowRun};

use crate::infrastructure::ProbeResult;

use super::{probe_policy, update_policy, LauncherInner, MonitorRequest};

pub const STEP_PROBE: &str = "probe-endpoint";
pub const STEP_UPDATE: &str = "update-health-status";

pub(crate) async fn run(
    ctx: &LauncherInner,
    request: &MonitorRequest,
) -> Result<ProbeResult, WorkflowError> {
    let run = WorkflowRun::new(request.workflow_id.clone(), ctx.checkpoint_store());

    let probe = ctx.probe.clone();
    let host = request.host.clone();
    let path = request.probe_path.clone();
    let result: ProbeResult = run
        .step(STEP_PROBE, &probe_policy(), || {
            let probe = probe.clone();
            let host = host.clone();
            let path = path.clone();
            async move { Ok(probe.probe(&host, &path).await) }
        })
        .await?;

    let handle = ctx.directory.get(&request.load_balancer_name);
    let delivered = result.clone();
    run.step::<(), _, _>(STEP_UPDATE, &update_policy(), || {
        let handle = handle.clone();
        let r = delivered.clone();
        async move {
            handle
                .apply_health_update(&r.host, r.is_healthy, r.checked_at)
                .await
                .map_err(|e| WorkflowError::Delivery(e.to_string()))
        }
    })
    .await?;

    // The raw probe result is the workflow's return value, for observability.
    Ok(result)
}
