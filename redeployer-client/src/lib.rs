//! Redeployer HTTP Client
//!
//! A small, typed client for the redeployer webhook API.
//!
//! # Example
//!
//! ```no_run
//! use redeployer_client::RedeployerClient;
//!
//! # async fn example() -> redeployer_client::Result<()> {
//! let client = RedeployerClient::new("http://localhost:9000");
//! let message = client
//!     .redeploy("my-token", "my-svc", "registry/my-svc:1.2")
//!     .await?;
//! println!("{message}");
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{ClientError, Result};

use redeployer_core::domain::request::{RedeploymentRequest, ResponseMessage};
use reqwest::Client;
use tracing::debug;

/// Header carrying the deploy token
pub const DEPLOY_TOKEN_HEADER: &str = "X-Deploy-Token";

/// Header carrying the request correlation id
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// HTTP client for the redeployer API
#[derive(Debug, Clone)]
pub struct RedeployerClient {
    /// Base URL of the service (e.g., "http://localhost:9000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl RedeployerClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the service (e.g., "http://localhost:9000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /health
    pub async fn health(&self) -> Result<String> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// POST /redeploy
    ///
    /// Returns the acknowledgement message. The redeploy itself runs in the
    /// background on the server; its outcome is not reported here.
    pub async fn redeploy(&self, token: &str, target: &str, image: &str) -> Result<String> {
        let url = format!("{}/redeploy", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(DEPLOY_TOKEN_HEADER, token)
            .json(&RedeploymentRequest {
                target: target.to_string(),
                image: image.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Check the status and extract the `message` field
    async fn handle_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        if let Some(id) = response.headers().get(REQUEST_ID_HEADER) {
            debug!("Response for request {:?}: {}", id, status);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ResponseMessage>(&text).map(|m| m.message);

        if !status.is_success() {
            return Err(ClientError::api_error(
                status.as_u16(),
                message.unwrap_or(text),
            ));
        }

        message.map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
