//! Redeploy workflow
//!
//! Replaces the running container of a target with a new image:
//!
//! 1. Pull the new image
//! 2. Resolve the image of the currently running container
//! 3. Remove that container, if one exists
//! 4. Execute the target's deployment action with the new image
//! 5. Remove the previous image, if there was one and it differs
//!
//! Every step is best effort: a failure is logged and the next step still
//! runs. Nothing is retried and nothing is rolled back. The workflow runs
//! detached from the HTTP request that triggered it, inside a panic boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use redeployer_core::{Target, TargetSet};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::container::{ContainerControl, ControlError};
use crate::context::RequestContext;

/// Workflow steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Pull,
    ResolvePrevious,
    RemoveContainer,
    Execute,
    RemoveImage,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Pull => write!(f, "pull"),
            Step::ResolvePrevious => write!(f, "resolve-previous"),
            Step::RemoveContainer => write!(f, "remove-container"),
            Step::Execute => write!(f, "execute"),
            Step::RemoveImage => write!(f, "remove-image"),
        }
    }
}

/// Outcome of one workflow run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedeployReport {
    /// Image of the container that was running before the redeploy
    pub previous_image: Option<String>,

    /// Steps that ran, in order
    pub attempted: Vec<Step>,

    /// Steps that ran and failed
    pub failed: Vec<Step>,

    /// Output of the deployment action
    pub output: Option<String>,
}

impl RedeployReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, step: Step, ok: bool) {
        self.attempted.push(step);
        if !ok {
            self.failed.push(step);
        }
    }
}

/// Launches redeploy workflows
///
/// Holds one lock per configured target so that two redeploys of the same
/// target never interleave their container operations. Redeploys of different
/// targets run concurrently. The lock map is built once and never changes.
pub struct Redeployer {
    control: Arc<dyn ContainerControl>,
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl Redeployer {
    pub fn new(control: Arc<dyn ContainerControl>, targets: &TargetSet) -> Self {
        let locks = targets
            .ids()
            .map(|id| (id.to_string(), Arc::new(Mutex::new(()))))
            .collect();

        Self { control, locks }
    }

    /// Spawns the workflow for a validated target and image
    ///
    /// Returns immediately. The returned handle resolves to the report, or
    /// `None` if the workflow panicked; callers that do not care simply drop
    /// it.
    pub fn trigger(
        &self,
        ctx: RequestContext,
        target: Target,
        image: String,
    ) -> JoinHandle<Option<RedeployReport>> {
        let control = Arc::clone(&self.control);
        let lock = self.locks.get(&target.id).cloned();
        let request_id = ctx.id.clone();

        let workflow = tokio::spawn(async move {
            let _guard = match lock {
                Some(lock) => Some(match Arc::clone(&lock).try_lock_owned() {
                    Ok(guard) => guard,
                    Err(_) => {
                        info!(
                            request_id = %ctx.id,
                            target = %target.id,
                            "Waiting for the running redeployment of this target to finish"
                        );
                        lock.lock_owned().await
                    }
                }),
                None => None,
            };
            redeploy(control.as_ref(), &ctx, &target, &image).await
        });

        tokio::spawn(async move {
            match workflow.await {
                Ok(report) => Some(report),
                Err(e) if e.is_panic() => {
                    error!(request_id = %request_id, "Redeployment panicked: {}", e);
                    None
                }
                Err(e) => {
                    error!(request_id = %request_id, "Redeployment task was cancelled: {}", e);
                    None
                }
            }
        })
    }
}

/// Runs the redeploy workflow to completion
pub async fn redeploy(
    control: &dyn ContainerControl,
    ctx: &RequestContext,
    target: &Target,
    image: &str,
) -> RedeployReport {
    info!(request_id = %ctx.id, target = %target.id, image, "Redeploying service");
    let mut report = RedeployReport::default();

    let pulled = control.pull(ctx, image).await;
    if let Err(e) = &pulled {
        warn!(
            request_id = %ctx.id,
            image,
            latency = %ctx.latency(),
            "Pull failed, continuing with redeployment: {}", e
        );
    }
    report.record(Step::Pull, pulled.is_ok());

    let previous = match control.resolve_running_image(ctx, &target.id).await {
        Ok(previous) => {
            debug!(request_id = %ctx.id, previous = %previous, "Found running container");
            report.record(Step::ResolvePrevious, true);
            Some(previous)
        }
        Err(ControlError::NoSuchContainer(_)) => {
            debug!(request_id = %ctx.id, target = %target.id, "No running container to remove");
            report.record(Step::ResolvePrevious, true);
            None
        }
        Err(e) => {
            error!(
                request_id = %ctx.id,
                target = %target.id,
                latency = %ctx.latency(),
                "Failed to resolve running container: {}", e
            );
            report.record(Step::ResolvePrevious, false);
            None
        }
    };

    if previous.is_some() {
        let removed = control.remove_container(ctx, &target.id).await;
        if let Err(e) = &removed {
            error!(
                request_id = %ctx.id,
                target = %target.id,
                latency = %ctx.latency(),
                "Failed to remove existing container: {}", e
            );
        }
        report.record(Step::RemoveContainer, removed.is_ok());
    }

    match control.execute_deploy_action(ctx, target, image).await {
        Ok(output) => {
            info!(
                request_id = %ctx.id,
                latency = %ctx.latency(),
                output = %output,
                "Deployment action finished"
            );
            report.output = Some(output);
            report.record(Step::Execute, true);
        }
        Err(e) => {
            error!(
                request_id = %ctx.id,
                latency = %ctx.latency(),
                "Failed to execute redeployment: {}", e
            );
            if let ControlError::CommandFailed { output, .. } = e {
                report.output = Some(output);
            }
            report.record(Step::Execute, false);
        }
    }

    // Redeploying the same tag must not delete the image now in use.
    if let Some(previous) = previous.as_deref().filter(|p| *p != image) {
        let removed = control.remove_image(ctx, previous).await;
        if let Err(e) = &removed {
            warn!(
                request_id = %ctx.id,
                previous,
                latency = %ctx.latency(),
                "Failed to remove previous image: {}", e
            );
        }
        report.record(Step::RemoveImage, removed.is_ok());
    }

    report.previous_image = previous;

    let steps: Vec<String> = report.attempted.iter().map(Step::to_string).collect();
    if report.succeeded() {
        info!(
            request_id = %ctx.id,
            execution_time = %ctx.latency(),
            steps = %steps.join(","),
            previous = ?report.previous_image,
            "Redeployment succeeded"
        );
    } else {
        let failed: Vec<String> = report.failed.iter().map(Step::to_string).collect();
        warn!(
            request_id = %ctx.id,
            execution_time = %ctx.latency(),
            steps = %steps.join(","),
            failed = %failed.join(","),
            output = ?report.output,
            "Redeployment finished with failures"
        );
    }

    report
}
