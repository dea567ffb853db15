//! Container runtime CLI adapter
//!
//! Drives docker (or podman, which accepts the same arguments) through its
//! command line:
//! - `pull <image>`
//! - `container inspect --format {{.Config.Image}} <name>`
//! - `rm -f <name>`
//! - `rmi <image>`
//!
//! Child processes are killed if their future is dropped, so in-flight calls
//! never outlive the process that started them.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use redeployer_core::Target;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{ContainerControl, ControlError};
use crate::context::RequestContext;

/// Default upper bound on a single runtime or deploy command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Container control backed by a runtime CLI
#[derive(Debug, Clone)]
pub struct CliContainerControl {
    runtime: String,
    timeout: Duration,
}

impl CliContainerControl {
    /// Creates an adapter for the given runtime binary (e.g. `docker`)
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Sets the limit after which a command is killed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the runtime is installed and answers `--version`
    pub async fn check_available(&self) -> Result<String, ControlError> {
        let version = run(&self.runtime, &["--version"], self.timeout).await?;
        info!("Container runtime is available: {}", version);
        Ok(version)
    }

    async fn runtime(&self, args: &[&str]) -> Result<String, ControlError> {
        run(&self.runtime, args, self.timeout).await
    }
}

#[async_trait]
impl ContainerControl for CliContainerControl {
    async fn pull(&self, ctx: &RequestContext, image: &str) -> Result<(), ControlError> {
        debug!(request_id = %ctx.id, image, latency = %ctx.latency(), "Pulling image");

        match self.runtime(&["pull", image]).await {
            Ok(output) => {
                debug!(
                    request_id = %ctx.id,
                    image,
                    latency = %ctx.latency(),
                    output = %output,
                    "Pulled image"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    request_id = %ctx.id,
                    image,
                    latency = %ctx.latency(),
                    error = %e,
                    "Failed to pull image"
                );
                Err(e)
            }
        }
    }

    async fn resolve_running_image(
        &self,
        ctx: &RequestContext,
        target_id: &str,
    ) -> Result<String, ControlError> {
        debug!(
            request_id = %ctx.id,
            name = target_id,
            latency = %ctx.latency(),
            "Retrieving image of container"
        );

        let result = self
            .runtime(&[
                "container",
                "inspect",
                "--format",
                "{{.Config.Image}}",
                target_id,
            ])
            .await;

        classify_inspect(target_id, result).inspect_err(|e| {
            if !matches!(e, ControlError::NoSuchContainer(_)) {
                error!(
                    request_id = %ctx.id,
                    name = target_id,
                    latency = %ctx.latency(),
                    error = %e,
                    "Failed to get image of container"
                );
            }
        })
    }

    async fn remove_container(
        &self,
        ctx: &RequestContext,
        target_id: &str,
    ) -> Result<(), ControlError> {
        debug!(
            request_id = %ctx.id,
            name = target_id,
            latency = %ctx.latency(),
            "Stopping and removing container"
        );

        match self.runtime(&["rm", "-f", target_id]).await {
            Ok(output) => {
                debug!(
                    request_id = %ctx.id,
                    name = target_id,
                    latency = %ctx.latency(),
                    output = %output,
                    "Removed container"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    request_id = %ctx.id,
                    name = target_id,
                    latency = %ctx.latency(),
                    error = %e,
                    "Failed to remove container"
                );
                Err(e)
            }
        }
    }

    async fn remove_image(&self, ctx: &RequestContext, image: &str) -> Result<(), ControlError> {
        debug!(request_id = %ctx.id, image, latency = %ctx.latency(), "Removing image");

        match self.runtime(&["rmi", image]).await {
            Ok(output) => {
                debug!(
                    request_id = %ctx.id,
                    image,
                    latency = %ctx.latency(),
                    output = %output,
                    "Removed image"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    request_id = %ctx.id,
                    image,
                    latency = %ctx.latency(),
                    error = %e,
                    "Failed to remove image"
                );
                Err(e)
            }
        }
    }

    async fn execute_deploy_action(
        &self,
        ctx: &RequestContext,
        target: &Target,
        image: &str,
    ) -> Result<String, ControlError> {
        debug!(
            request_id = %ctx.id,
            binary = %target.binary,
            script = %target.script,
            image,
            latency = %ctx.latency(),
            "Executing deployment action"
        );

        run(
            &target.binary,
            &[target.script.as_str(), image],
            self.timeout,
        )
        .await
    }
}

/// Maps the outcome of `container inspect` onto the resolve contract
///
/// Docker reports "No such container", podman "no such container"; both exit
/// non-zero. An empty image is treated the same way.
fn classify_inspect(
    target_id: &str,
    result: Result<String, ControlError>,
) -> Result<String, ControlError> {
    match result {
        Ok(image) if image.trim().is_empty() => {
            Err(ControlError::NoSuchContainer(target_id.to_string()))
        }
        Ok(image) => Ok(image.trim().to_string()),
        Err(ControlError::CommandFailed { output, .. })
            if output.to_lowercase().contains("no such container")
                || output.to_lowercase().contains("no such object") =>
        {
            Err(ControlError::NoSuchContainer(target_id.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Runs `program` with `args`, returning stdout and stderr combined
///
/// A single trailing newline is trimmed. Non-zero exit status becomes
/// [`ControlError::CommandFailed`] carrying the output. A command still
/// running after `timeout` is killed and reported as
/// [`ControlError::TimedOut`].
async fn run(program: &str, args: &[&str], timeout: Duration) -> Result<String, ControlError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| ControlError::TimedOut {
            command: format!("{} {}", program, args.join(" ")),
            timeout,
        })??;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if combined.ends_with('\n') {
        combined.pop();
    }

    if !output.status.success() {
        return Err(ControlError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            output: combined,
            code: output.status.code(),
        });
    }

    Ok(combined)
}
