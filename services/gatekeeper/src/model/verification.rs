//! Verification request records and review transitions.
use campus_authz::{Identity, IdentityId, RequestId, Role, TargetRole, VerificationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Approved,
    Rejected,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Approved => "approved",
            RequestState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != RequestState::Pending
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RequestState::Pending),
            "approved" => Ok(RequestState::Approved),
            "rejected" => Ok(RequestState::Rejected),
            other => Err(format!("unknown request state: {other}")),
        }
    }
}

/// Application to upgrade an identity to `target_role`.
///
/// Created `Pending`, reviewed exactly once, immutable afterwards apart from
/// the `needs_reconciliation` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VerificationRequest {
    #[schema(value_type = String, format = Uuid)]
    pub id: RequestId,
    #[schema(value_type = String, format = Uuid)]
    pub identity_id: IdentityId,
    #[schema(value_type = String, example = "instructor")]
    pub target_role: TargetRole,
    pub state: RequestState,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = Uuid)]
    pub reviewer_id: Option<IdentityId>,
    pub rejection_reason: Option<String>,
    /// Set when the review was recorded but the identity update did not land.
    pub needs_reconciliation: bool,
}

impl VerificationRequest {
    pub fn new_pending(
        identity_id: IdentityId,
        target_role: TargetRole,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: RequestId::new(),
            identity_id,
            target_role,
            state: RequestState::Pending,
            payload,
            submitted_at: Utc::now(),
            reviewed_at: None,
            reviewer_id: None,
            rejection_reason: None,
            needs_reconciliation: false,
        }
    }

    /// Apply a review to a pending request. Callers check `state` first.
    pub fn apply_review(&mut self, commit: &ReviewCommit) {
        self.state = commit.outcome;
        self.reviewed_at = Some(commit.reviewed_at);
        self.reviewer_id = Some(commit.reviewer_id);
        self.rejection_reason = commit.reason.clone();
    }
}

/// A terminal transition for one pending request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewCommit {
    pub request_id: RequestId,
    pub reviewer_id: IdentityId,
    /// `Approved` or `Rejected`.
    pub outcome: RequestState,
    pub reason: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewCommit {
    pub fn approve(request_id: RequestId, reviewer_id: IdentityId) -> Self {
        Self {
            request_id,
            reviewer_id,
            outcome: RequestState::Approved,
            reason: None,
            reviewed_at: Utc::now(),
        }
    }

    pub fn reject(request_id: RequestId, reviewer_id: IdentityId, reason: &str) -> Self {
        Self {
            request_id,
            reviewer_id,
            outcome: RequestState::Rejected,
            reason: Some(reason.to_string()),
            reviewed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub identity_id: Option<IdentityId>,
    pub state: Option<RequestState>,
    pub needs_reconciliation: Option<bool>,
}

impl RequestFilter {
    pub fn matches(&self, request: &VerificationRequest) -> bool {
        self.identity_id.is_none_or(|id| id == request.identity_id)
            && self.state.is_none_or(|state| state == request.state)
            && self
                .needs_reconciliation
                .is_none_or(|flag| flag == request.needs_reconciliation)
    }
}

/// Why an identity may not open a new verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("admin identities cannot apply for verification")]
    Admin,
    #[error("identity already holds verified role {0}")]
    AlreadyVerified(Role),
}

/// Admins and verified recruiters/instructors; reviews never move their role.
pub fn holds_settled_role(identity: &Identity) -> bool {
    identity.base_role == Role::Admin
        || (identity.base_role.is_elevated() && identity.is_verified())
}

/// Checked by stores under the identity lock before a request is inserted.
pub fn check_submission(identity: &Identity) -> Result<(), Ineligible> {
    if identity.base_role == Role::Admin {
        return Err(Ineligible::Admin);
    }
    if holds_settled_role(identity) {
        return Err(Ineligible::AlreadyVerified(identity.base_role));
    }
    Ok(())
}

/// Approving a request for a settled identity would swap its role.
///
/// Rejections are always allowed; they leave a settled identity untouched.
pub fn check_review(identity: &Identity, commit: &ReviewCommit) -> Result<(), String> {
    if commit.outcome == RequestState::Approved && holds_settled_role(identity) {
        return Err(format!(
            "identity already holds verified role {}; reject the request instead",
            identity.base_role
        ));
    }
    Ok(())
}

/// Role and status an identity must carry once `request` has been reviewed.
///
/// `other_pending` tells whether the identity still has a different pending
/// request; a rejection then leaves the status `Pending`.
pub fn identity_after_review(
    identity: &Identity,
    request: &VerificationRequest,
    other_pending: bool,
) -> (Role, VerificationStatus) {
    if holds_settled_role(identity) {
        return (identity.base_role, identity.verification_status);
    }
    match request.state {
        RequestState::Approved => (request.target_role.role(), VerificationStatus::Verified),
        RequestState::Rejected if other_pending => {
            (identity.base_role, VerificationStatus::Pending)
        }
        RequestState::Rejected => (identity.base_role, VerificationStatus::Rejected),
        RequestState::Pending => (identity.base_role, VerificationStatus::Pending),
    }
}
