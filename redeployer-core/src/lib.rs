//! Redeployer Core
//!
//! Core types and logic for the redeployer webhook service.
//!
//! This crate contains:
//! - Key handling: parsing encoded scrypt key policies and deriving hashes
//! - Authentication: verifying deploy tokens against the configured key
//! - Domain types: deployment targets, image matching and request bodies

pub mod auth;
pub mod domain;
pub mod key;

pub use auth::{AuthError, Authenticator};
pub use domain::target::{MatchError, Target, TargetSet};
pub use key::{KeyError, ScryptKey};
