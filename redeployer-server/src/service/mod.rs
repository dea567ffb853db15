//! Service layer
//!
//! Business logic that runs after a request has been validated.

pub mod redeploy;

pub use redeploy::{RedeployReport, Redeployer, Step};
