//! Recording container control for tests

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redeployer_core::Target;
use tokio::sync::Notify;

use super::{ContainerControl, ControlError};
use crate::context::RequestContext;
use crate::service::Step;

/// One observed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pull(String),
    ResolveRunningImage(String),
    RemoveContainer(String),
    /// Target id and image
    Execute(String, String),
    RemoveImage(String),
}

/// Records every call in order and answers from canned state
#[derive(Default)]
pub struct RecordingControl {
    running_image: Option<String>,
    failing: HashSet<Step>,
    panicking: Option<Step>,
    calls: Mutex<Vec<Call>>,
    notify: Notify,
}

impl RecordingControl {
    /// A runtime where the target's container runs `image`
    pub fn running(image: &str) -> Self {
        Self {
            running_image: Some(image.to_string()),
            ..Self::default()
        }
    }

    /// A runtime with no container for the target
    pub fn empty() -> Self {
        Self::default()
    }

    /// Makes `step` return an error
    pub fn failing(mut self, step: Step) -> Self {
        self.failing.insert(step);
        self
    }

    /// Makes `step` panic after recording the call
    pub fn panicking(mut self, step: Step) -> Self {
        self.panicking = Some(step);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Waits until at least `count` calls were recorded
    pub async fn wait_for_calls(&self, count: usize) -> Vec<Call> {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let notified = self.notify.notified();
                if self.calls.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for container calls");

        self.calls()
    }

    async fn record(&self, step: Step, call: Call) -> Result<(), ControlError> {
        // Give concurrent workflows a chance to interleave.
        tokio::task::yield_now().await;

        self.calls.lock().unwrap().push(call);
        self.notify.notify_waiters();

        if self.panicking == Some(step) {
            panic!("{step} exploded");
        }

        if self.failing.contains(&step) {
            return Err(ControlError::CommandFailed {
                command: step.to_string(),
                output: format!("{step} failed"),
                code: Some(1),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ContainerControl for RecordingControl {
    async fn pull(&self, _ctx: &RequestContext, image: &str) -> Result<(), ControlError> {
        self.record(Step::Pull, Call::Pull(image.to_string())).await
    }

    async fn resolve_running_image(
        &self,
        _ctx: &RequestContext,
        target_id: &str,
    ) -> Result<String, ControlError> {
        self.record(
            Step::ResolvePrevious,
            Call::ResolveRunningImage(target_id.to_string()),
        )
        .await?;

        self.running_image
            .clone()
            .ok_or_else(|| ControlError::NoSuchContainer(target_id.to_string()))
    }

    async fn remove_container(
        &self,
        _ctx: &RequestContext,
        target_id: &str,
    ) -> Result<(), ControlError> {
        self.record(
            Step::RemoveContainer,
            Call::RemoveContainer(target_id.to_string()),
        )
        .await
    }

    async fn remove_image(&self, _ctx: &RequestContext, image: &str) -> Result<(), ControlError> {
        self.record(Step::RemoveImage, Call::RemoveImage(image.to_string()))
            .await
    }

    async fn execute_deploy_action(
        &self,
        _ctx: &RequestContext,
        target: &Target,
        image: &str,
    ) -> Result<String, ControlError> {
        self.record(
            Step::Execute,
            Call::Execute(target.id.clone(), image.to_string()),
        )
        .await?;

        Ok(format!("deployed {image}"))
    }
}
