//! Gatekeeper HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules and the shared helpers handlers use to read
//! the caller identity and query parameters.
pub mod access;
pub mod admin;
pub mod error;
pub mod identities;
pub mod internal;
pub mod openapi;
pub mod system;
pub mod types;
pub mod verification;

use crate::api::error::{ApiError, api_forbidden, api_unauthorized, api_validation_error};
use crate::guard::RequestContext;
use crate::model::{Identity, Role};
use std::collections::HashMap;
use std::str::FromStr;

pub(crate) fn require_identity(ctx: &RequestContext) -> Result<&Identity, ApiError> {
    ctx.identity
        .as_ref()
        .ok_or_else(|| api_unauthorized("session required"))
}

pub(crate) fn require_admin(ctx: &RequestContext) -> Result<&Identity, ApiError> {
    let identity = require_identity(ctx)?;
    if identity.base_role != Role::Admin {
        return Err(api_forbidden("admin role required"));
    }
    Ok(identity)
}

/// Parse an optional query parameter, rejecting malformed values with 400.
pub(crate) fn query_param<T>(params: &HashMap<String, String>, name: &str) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|err| api_validation_error(&format!("invalid {name}: {err}"))),
    }
}

pub(crate) fn required_param<T>(params: &HashMap<String, String>, name: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    query_param(params, name)?.ok_or_else(|| api_validation_error(&format!("{name} is required")))
}
