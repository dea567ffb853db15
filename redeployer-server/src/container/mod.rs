//! Container control
//!
//! The narrow set of image and container operations the redeploy workflow
//! needs. The production adapter shells out to a container runtime CLI; tests
//! substitute a recording fake.

mod cli;
#[cfg(test)]
pub mod fake;

pub use cli::{CliContainerControl, DEFAULT_COMMAND_TIMEOUT};

use std::time::Duration;

use async_trait::async_trait;
use redeployer_core::Target;
use thiserror::Error;

use crate::context::RequestContext;

/// Errors returned by container operations
#[derive(Debug, Error)]
pub enum ControlError {
    /// No container with this name exists
    #[error("No such container: {0}")]
    NoSuchContainer(String),

    /// The command ran and exited unsuccessfully
    #[error("Command `{command}` failed (exit code {code:?}): {output}")]
    CommandFailed {
        command: String,
        output: String,
        code: Option<i32>,
    },

    /// The command was killed after running too long
    #[error("Command `{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// The command could not be started
    #[error("Failed to run command: {0}")]
    Io(#[from] std::io::Error),
}

/// Image and container lifecycle operations
#[async_trait]
pub trait ContainerControl: Send + Sync {
    /// Pulls `image` from its registry
    async fn pull(&self, ctx: &RequestContext, image: &str) -> Result<(), ControlError>;

    /// Returns the image of the container named after `target_id`
    ///
    /// [`ControlError::NoSuchContainer`] when no such container exists.
    async fn resolve_running_image(
        &self,
        ctx: &RequestContext,
        target_id: &str,
    ) -> Result<String, ControlError>;

    /// Stops and removes the container named after `target_id`
    async fn remove_container(&self, ctx: &RequestContext, target_id: &str)
    -> Result<(), ControlError>;

    /// Removes `image` from the local store
    async fn remove_image(&self, ctx: &RequestContext, image: &str) -> Result<(), ControlError>;

    /// Runs the target's deployment action with `image` as its argument,
    /// returning the combined output
    async fn execute_deploy_action(
        &self,
        ctx: &RequestContext,
        target: &Target,
        image: &str,
    ) -> Result<String, ControlError>;
}
