//! Core domain types
//!
//! Deployment targets and the request/response bodies exchanged with the
//! webhook. These are shared between the server (validation and execution)
//! and the client (request building).

pub mod request;
pub mod target;
