//! Request context
//!
//! Correlation data for one HTTP call and the redeploy it may spawn:
//! - Request id, taken from `X-Request-ID` or freshly generated
//! - Start time for latency reporting
//!
//! The context travels with the detached workflow so every log line of a
//! redeploy can be tied back to the request that triggered it.

use std::time::Instant;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Header carrying the request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request correlation context
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Caller supplied or generated request id
    pub id: String,

    /// Wall clock time the request arrived
    pub started_at: DateTime<Utc>,

    start: Instant,
}

impl RequestContext {
    /// Creates a context with the given id, starting the clock now
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    /// Builds a context from request headers, generating an id if the caller
    /// did not send a usable one
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self::new(id)
    }

    /// Time elapsed since the request arrived, formatted in milliseconds
    pub fn latency(&self) -> String {
        format!("{:.2} ms", self.start.elapsed().as_secs_f64() * 1000.0)
    }
}
