//! In-memory implementation of the gatekeeper store.
//!
//! # Purpose
//! Implements [`IdentityStore`] and [`VerificationStore`] with plain
//! collections guarded by `tokio::sync::RwLock`. It exists for local
//! development, tests, and deployments where durability is not required.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: mutations take write locks; reads share
//!   read locks.
//! - **Atomic reviews**: `commit_review` and `submit_request` hold both the
//!   request and the identity write locks for the whole mutation, so the
//!   store reports `supports_transactions() == true`.
//!
//! # Lock ordering
//! Whenever both locks are needed, `requests` is acquired before
//! `identities`. Every method follows this order to rule out deadlocks.
//!
//! # Performance characteristics
//! Lookups by email and by request id scan; acceptable for dev workloads.
use super::{GatekeeperStore, IdentityStore, StoreError, StoreResult, VerificationStore};
use crate::model::{
    Identity, IdentityId, RequestFilter, RequestId, RequestState, ReviewCommit, Role, TargetRole,
    VerificationRequest, VerificationStatus, check_review, check_submission,
    identity_after_review,
};
use async_trait::async_trait;
use campus_authz::normalize_email;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    /// Authoritative identities keyed by id.
    identities: Arc<RwLock<HashMap<IdentityId, Identity>>>,
    /// Verification requests in submission order.
    ///
    /// Insertion order doubles as the tie-breaker for "latest request".
    requests: Arc<RwLock<Vec<VerificationRequest>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn has_other_pending(requests: &[VerificationRequest], request: &VerificationRequest) -> bool {
    requests.iter().any(|other| {
        other.identity_id == request.identity_id
            && other.id != request.id
            && other.state == RequestState::Pending
    })
}

fn checked(identity: Identity) -> StoreResult<Identity> {
    identity
        .check_invariants()
        .map_err(|err| StoreError::Conflict(err.to_string()))?;
    Ok(identity)
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn create_identity(&self, identity: Identity) -> StoreResult<Identity> {
        let identity = checked(identity)?;
        let mut identities = self.identities.write().await;
        if identities.contains_key(&identity.id) {
            return Err(StoreError::Conflict("identity exists".into()));
        }
        if identities.values().any(|existing| existing.email == identity.email) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn get_identity(&self, id: IdentityId) -> StoreResult<Identity> {
        self.identities
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("identity".into()))
    }

    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let email = normalize_email(email);
        Ok(self
            .identities
            .read()
            .await
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn set_identity_role(
        &self,
        id: IdentityId,
        role: Role,
        status: VerificationStatus,
    ) -> StoreResult<Identity> {
        let mut identities = self.identities.write().await;
        let current = identities
            .get(&id)
            .ok_or_else(|| StoreError::NotFound("identity".into()))?;
        let mut updated = current.clone();
        updated.base_role = role;
        updated.verification_status = status;
        updated.updated_at = Utc::now();
        let updated = checked(updated)?;
        identities.insert(id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl VerificationStore for InMemoryStore {
    async fn submit_request(
        &self,
        request: VerificationRequest,
    ) -> StoreResult<VerificationRequest> {
        let mut requests = self.requests.write().await;
        let mut identities = self.identities.write().await;
        let identity = identities
            .get_mut(&request.identity_id)
            .ok_or_else(|| StoreError::NotFound("identity".into()))?;
        check_submission(identity)?;
        if requests.iter().any(|existing| {
            existing.identity_id == request.identity_id
                && existing.target_role == request.target_role
                && existing.state == RequestState::Pending
        }) {
            return Err(StoreError::Conflict("pending request exists".into()));
        }
        identity.verification_status = VerificationStatus::Pending;
        identity.updated_at = Utc::now();
        requests.push(request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<VerificationRequest> {
        self.requests
            .read()
            .await
            .iter()
            .find(|request| request.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("verification request".into()))
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> StoreResult<Vec<VerificationRequest>> {
        Ok(self
            .requests
            .read()
            .await
            .iter()
            .filter(|request| filter.matches(request))
            .cloned()
            .collect())
    }

    async fn latest_request(
        &self,
        identity_id: IdentityId,
        target_role: TargetRole,
    ) -> StoreResult<Option<VerificationRequest>> {
        Ok(self
            .requests
            .read()
            .await
            .iter()
            .rev()
            .find(|request| {
                request.identity_id == identity_id && request.target_role == target_role
            })
            .cloned())
    }

    async fn transition_request(&self, commit: &ReviewCommit) -> StoreResult<VerificationRequest> {
        let mut requests = self.requests.write().await;
        let request = requests
            .iter_mut()
            .find(|request| request.id == commit.request_id)
            .ok_or_else(|| StoreError::NotFound("verification request".into()))?;
        if request.state.is_terminal() {
            return Err(StoreError::StaleState("request already reviewed".into()));
        }
        request.apply_review(commit);
        request.needs_reconciliation = true;
        Ok(request.clone())
    }

    async fn commit_review(
        &self,
        commit: &ReviewCommit,
    ) -> StoreResult<(VerificationRequest, Identity)> {
        let mut requests = self.requests.write().await;
        let mut identities = self.identities.write().await;

        let index = requests
            .iter()
            .position(|request| request.id == commit.request_id)
            .ok_or_else(|| StoreError::NotFound("verification request".into()))?;
        if requests[index].state.is_terminal() {
            return Err(StoreError::StaleState("request already reviewed".into()));
        }
        let identity = identities
            .get(&requests[index].identity_id)
            .ok_or_else(|| StoreError::NotFound("identity".into()))?;
        check_review(identity, commit).map_err(StoreError::Conflict)?;
        let mut reviewed = requests[index].clone();
        reviewed.apply_review(commit);

        let (role, status) =
            identity_after_review(identity, &reviewed, has_other_pending(&requests, &reviewed));
        let mut updated = identity.clone();
        updated.base_role = role;
        updated.verification_status = status;
        updated.updated_at = Utc::now();
        let updated = checked(updated)?;

        // Both records validated; apply while still holding both locks.
        requests[index] = reviewed.clone();
        identities.insert(updated.id, updated.clone());
        Ok((reviewed, updated))
    }

    async fn set_reconciliation_flag(&self, id: RequestId, flag: bool) -> StoreResult<()> {
        let mut requests = self.requests.write().await;
        let request = requests
            .iter_mut()
            .find(|request| request.id == id)
            .ok_or_else(|| StoreError::NotFound("verification request".into()))?;
        request.needs_reconciliation = flag;
        Ok(())
    }
}

#[async_trait]
impl GatekeeperStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
