//! Authentication helpers.
//!
//! # Purpose
//! Session tokens identify the caller only; role and verification status are
//! always loaded from the store by the route guard.
pub mod session;
