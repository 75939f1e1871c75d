//! Gatekeeper data model.
//!
//! # Purpose
//! Re-exports the identity model from `campus-authz` and defines verification
//! request records plus the rule that maps a review onto its identity.
mod verification;

pub use campus_authz::{
    Identity, IdentityId, RequestId, Role, TargetRole, VerificationStatus, normalize_email,
};
pub use verification::{
    Ineligible, RequestFilter, RequestState, ReviewCommit, VerificationRequest, check_review,
    check_submission, identity_after_review,
};
