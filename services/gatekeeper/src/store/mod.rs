//! Storage contracts for identities and verification requests.
//!
//! # Purpose
//! Defines the traits every backend implements plus the shared error type.
//!
//! # Key invariants
//! - At most one `Pending` request per `(identity_id, target_role)`; a second
//!   insert fails with [`StoreError::Conflict`].
//! - Reviews are compare-and-set on `Pending`; a lost race is
//!   [`StoreError::StaleState`].
//! - Submission eligibility ([`check_submission`]) is checked under the
//!   identity lock that marks the identity `Pending`, so a concurrent approval
//!   cannot be overwritten by a late submission.
//! - [`VerificationStore::transition_request`] raises `needs_reconciliation`
//!   in the same write as the state change; the workflow clears it once the
//!   identity update has landed.
//! - Backends reporting `supports_transactions()` apply the request
//!   transition and the identity update of [`VerificationStore::commit_review`]
//!   atomically. Other backends leave multi-record consistency to the
//!   workflow saga and only need the single-record primitives.
//!
//! [`check_submission`]: crate::model::check_submission
use crate::model::{
    Identity, IdentityId, Ineligible, RequestFilter, RequestId, ReviewCommit, Role, TargetRole,
    VerificationRequest, VerificationStatus,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;
#[cfg(all(test, feature = "pg-tests"))]
mod postgres_tests;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("stale state: {0}")]
    StaleState(String),
    #[error("ineligible: {0}")]
    Ineligible(#[from] Ineligible),
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    /// Retryable infrastructure failure (pool exhaustion, dropped connection).
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a new identity; `Conflict` when the email is taken.
    async fn create_identity(&self, identity: Identity) -> StoreResult<Identity>;
    async fn get_identity(&self, id: IdentityId) -> StoreResult<Identity>;
    /// Case-insensitive email lookup.
    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;
    /// Overwrite role and status together.
    async fn set_identity_role(
        &self,
        id: IdentityId,
        role: Role,
        status: VerificationStatus,
    ) -> StoreResult<Identity>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Insert a pending request and mark its identity `Pending` in one step.
    ///
    /// Fails with [`StoreError::Ineligible`] when [`crate::model::check_submission`] refuses
    /// the identity as read under its lock.
    async fn submit_request(&self, request: VerificationRequest)
    -> StoreResult<VerificationRequest>;
    async fn get_request(&self, id: RequestId) -> StoreResult<VerificationRequest>;
    /// Requests matching `filter`, oldest submission first.
    async fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<VerificationRequest>>;
    /// Most recent request for the pair, pending or terminal.
    async fn latest_request(
        &self,
        identity_id: IdentityId,
        target_role: TargetRole,
    ) -> StoreResult<Option<VerificationRequest>>;
    /// Compare-and-set a pending request to its terminal state and raise its
    /// `needs_reconciliation` flag. The identity is not touched.
    async fn transition_request(&self, commit: &ReviewCommit) -> StoreResult<VerificationRequest>;
    /// Transition the request and update its identity atomically.
    ///
    /// Approving a request whose identity already holds a settled role is a
    /// [`StoreError::Conflict`] and leaves the request pending. Only called
    /// when `supports_transactions()` is true.
    async fn commit_review(&self, commit: &ReviewCommit)
    -> StoreResult<(VerificationRequest, Identity)>;
    async fn set_reconciliation_flag(&self, id: RequestId, flag: bool) -> StoreResult<()>;
}

#[async_trait]
pub trait GatekeeperStore: IdentityStore + VerificationStore {
    async fn health_check(&self) -> StoreResult<()>;
    fn supports_transactions(&self) -> bool;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable(anyhow::anyhow!("pool timeout")).is_transient());
        assert!(!StoreError::Unexpected(anyhow::anyhow!("boom")).is_transient());
        assert!(!StoreError::Conflict("dup".into()).is_transient());
    }
}
