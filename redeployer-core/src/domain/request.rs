//! Request and response bodies

use serde::{Deserialize, Serialize};

/// Body of `POST /redeploy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeploymentRequest {
    /// Identifier of the target to redeploy
    pub target: String,

    /// Image reference to deploy
    pub image: String,
}

/// JSON body of every response, success or error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub message: String,
}

impl ResponseMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
