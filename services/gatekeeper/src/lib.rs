//! Campus gatekeeper service library crate.
//!
//! # Purpose
//! Exposes the route guard, verification workflow, HTTP API surface,
//! configuration, and storage backends for use by the binary and tests.
//!
//! # Notes
//! Pure authorization rules live in `campus-authz`; this crate adds I/O.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod guard;
pub mod identity;
pub mod model;
pub mod observability;
pub mod store;
#[cfg(test)]
mod test_env;
pub mod workflow;
