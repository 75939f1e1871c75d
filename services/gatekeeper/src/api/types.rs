//! HTTP API request/response types.
//!
//! # Purpose
//! Payload shapes for the gatekeeper REST API and OpenAPI schema generation.
use crate::model::{
    Identity, IdentityId, RequestId, RequestState, Role, TargetRole, VerificationRequest,
    VerificationStatus,
};
use crate::workflow::CurrentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub backend: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct IdentityResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: IdentityId,
    pub email: String,
    pub display_name: Option<String>,
    #[schema(value_type = String, example = "student")]
    pub base_role: Role,
    #[schema(value_type = String, example = "unverified")]
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            display_name: identity.display_name,
            base_role: identity.base_role,
            verification_status: identity.verification_status,
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SubmitVerificationRequest {
    #[schema(value_type = String, format = Uuid)]
    pub identity_id: IdentityId,
    #[schema(value_type = String, example = "recruiter")]
    pub target_role: TargetRole,
    #[serde(default = "empty_payload")]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SubmitVerificationResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: RequestId,
    pub state: RequestState,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct VerificationStatusResponse {
    #[schema(value_type = String, format = Uuid)]
    pub identity_id: IdentityId,
    #[schema(value_type = String, example = "instructor")]
    pub target_role: TargetRole,
    pub state: CurrentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ReviewRequest {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub decision: ReviewDecision,
    /// Required when rejecting.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationRequestListResponse {
    pub items: Vec<VerificationRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AssignRoleRequest {
    #[schema(value_type = String, example = "instructor")]
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateSessionRequest {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateSessionResponse {
    pub identity: IdentityResponse,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
