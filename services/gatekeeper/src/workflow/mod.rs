//! Verification workflow service.
//!
//! # Purpose
//! Drives verification requests through their lifecycle: submission, admin
//! review, status queries, and reconciliation of half-applied reviews.
//!
//! # Consistency model
//! A review updates two records, the request and its identity. When the store
//! reports `supports_transactions()` both land in one atomic
//! [`VerificationStore::commit_review`]. Otherwise the workflow runs a saga:
//! 1. Compare-and-set the request to its terminal state with
//!    `needs_reconciliation` raised in the same write. This step is
//!    authoritative; once it succeeds the decision stands.
//! 2. Update the identity, then clear the flag. If the update fails the
//!    caller gets [`WorkflowError::TransientStorage`] and the flag stays up,
//!    so [`VerificationWorkflow::reconcile`] re-applies the update later.
//!
//! # Settled identities
//! Admins and verified recruiters/instructors keep their role. Approving a
//! leftover request for such an identity is a [`WorkflowError::Conflict`];
//! rejecting it leaves the identity unchanged.
//!
//! # Concurrency
//! Two reviewers racing on the same request get exactly one success; the
//! loser sees [`WorkflowError::AlreadyReviewed`].
//!
//! [`VerificationStore::commit_review`]: crate::store::VerificationStore::commit_review
use crate::model::{
    Identity, IdentityId, Ineligible, RequestFilter, RequestId, RequestState, ReviewCommit, Role,
    TargetRole, VerificationRequest, check_review, identity_after_review,
};
use crate::store::{GatekeeperStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

pub type SharedStore = Arc<dyn GatekeeperStore>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request {0} was already reviewed")]
    AlreadyReviewed(RequestId),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("transient storage failure: {0}")]
    TransientStorage(#[source] StoreError),
    #[error("storage failure: {0}")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => WorkflowError::NotFound(what),
            StoreError::Conflict(what) | StoreError::StaleState(what) => {
                WorkflowError::Conflict(what)
            }
            StoreError::Ineligible(reason @ Ineligible::Admin) => {
                WorkflowError::Forbidden(reason.to_string())
            }
            StoreError::Ineligible(reason @ Ineligible::AlreadyVerified(_)) => {
                WorkflowError::Conflict(reason.to_string())
            }
            err if err.is_transient() => WorkflowError::TransientStorage(err),
            err => WorkflowError::Internal(err),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Latest verification state for an `(identity, target_role)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CurrentStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

impl From<RequestState> for CurrentStatus {
    fn from(state: RequestState) -> Self {
        match state {
            RequestState::Pending => CurrentStatus::Pending,
            RequestState::Approved => CurrentStatus::Approved,
            RequestState::Rejected => CurrentStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconcileReport {
    /// Flagged requests whose identity update was applied this pass.
    pub reconciled: usize,
    /// Flagged requests still outstanding after this pass.
    pub remaining: usize,
}

#[derive(Clone)]
pub struct VerificationWorkflow {
    store: SharedStore,
}

impl VerificationWorkflow {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn submit(
        &self,
        identity_id: IdentityId,
        target_role: TargetRole,
        payload: serde_json::Value,
    ) -> WorkflowResult<VerificationRequest> {
        if !payload.is_object() {
            return Err(WorkflowError::Invalid(
                "payload must be a JSON object".to_string(),
            ));
        }
        let request = self
            .store
            .submit_request(VerificationRequest::new_pending(
                identity_id,
                target_role,
                payload,
            ))
            .await?;
        metrics::counter!("gatekeeper_verification_submissions_total", "target_role" => target_role.as_str())
            .increment(1);
        tracing::info!(
            request_id = %request.id,
            identity_id = %identity_id,
            target_role = %target_role,
            "verification request submitted"
        );
        Ok(request)
    }

    pub async fn approve(
        &self,
        request_id: RequestId,
        reviewer_id: IdentityId,
    ) -> WorkflowResult<VerificationRequest> {
        self.review(ReviewCommit::approve(request_id, reviewer_id))
            .await
    }

    pub async fn reject(
        &self,
        request_id: RequestId,
        reviewer_id: IdentityId,
        reason: &str,
    ) -> WorkflowResult<VerificationRequest> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::Invalid(
                "rejection requires a reason".to_string(),
            ));
        }
        self.review(ReviewCommit::reject(request_id, reviewer_id, reason))
            .await
    }

    /// Latest state for the pair; storage outages read as `None`.
    pub async fn current_status(
        &self,
        identity_id: IdentityId,
        target_role: TargetRole,
    ) -> WorkflowResult<CurrentStatus> {
        match self.store.latest_request(identity_id, target_role).await {
            Ok(Some(request)) => Ok(request.state.into()),
            Ok(None) => Ok(CurrentStatus::None),
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, identity_id = %identity_id, "status lookup degraded");
                Ok(CurrentStatus::None)
            }
            Err(err) => Err(WorkflowError::Internal(err)),
        }
    }

    pub async fn get_request(&self, request_id: RequestId) -> WorkflowResult<VerificationRequest> {
        Ok(self.store.get_request(request_id).await?)
    }

    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> WorkflowResult<Vec<VerificationRequest>> {
        Ok(self.store.list_requests(filter).await?)
    }

    /// Re-apply identity updates for reviews the saga could not finish.
    pub async fn reconcile(&self) -> WorkflowResult<ReconcileReport> {
        let flagged = self
            .store
            .list_requests(&RequestFilter {
                needs_reconciliation: Some(true),
                ..RequestFilter::default()
            })
            .await?;

        let mut report = ReconcileReport::default();
        for request in flagged {
            let outcome = match self.apply_identity_update(&request).await {
                Ok(_) => self.store.set_reconciliation_flag(request.id, false).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => {
                    report.reconciled += 1;
                    tracing::info!(request_id = %request.id, "verification review reconciled");
                }
                Err(err) => {
                    report.remaining += 1;
                    tracing::warn!(request_id = %request.id, error = %err, "reconciliation failed");
                }
            }
        }
        if report.reconciled > 0 {
            metrics::counter!("gatekeeper_reconciled_reviews_total")
                .increment(report.reconciled as u64);
        }
        Ok(report)
    }

    async fn review(&self, commit: ReviewCommit) -> WorkflowResult<VerificationRequest> {
        self.ensure_reviewer(commit.reviewer_id).await?;

        let request = if self.store.supports_transactions() {
            let (request, _identity) = self
                .store
                .commit_review(&commit)
                .await
                .map_err(|err| review_error(commit.request_id, err))?;
            request
        } else {
            self.review_saga(&commit).await?
        };

        metrics::counter!("gatekeeper_verification_reviews_total", "outcome" => request.state.as_str())
            .increment(1);
        tracing::info!(
            request_id = %request.id,
            reviewer_id = %commit.reviewer_id,
            outcome = %request.state,
            "verification request reviewed"
        );
        Ok(request)
    }

    async fn review_saga(&self, commit: &ReviewCommit) -> WorkflowResult<VerificationRequest> {
        let pending = self.store.get_request(commit.request_id).await?;
        if pending.state.is_terminal() {
            return Err(WorkflowError::AlreadyReviewed(commit.request_id));
        }
        let identity = self.store.get_identity(pending.identity_id).await?;
        check_review(&identity, commit).map_err(WorkflowError::Conflict)?;

        let mut request = self
            .store
            .transition_request(commit)
            .await
            .map_err(|err| review_error(commit.request_id, err))?;

        if let Err(err) = self.apply_identity_update(&request).await {
            tracing::warn!(
                request_id = %request.id,
                identity_id = %request.identity_id,
                error = %err,
                "identity update failed after review; left flagged for reconciliation"
            );
            metrics::counter!("gatekeeper_reconciliation_flags_total").increment(1);
            return Err(WorkflowError::TransientStorage(err));
        }
        match self.store.set_reconciliation_flag(request.id, false).await {
            Ok(()) => request.needs_reconciliation = false,
            // Identity already matches; the next reconcile pass clears the flag.
            Err(err) => tracing::warn!(
                request_id = %request.id,
                error = %err,
                "failed to clear reconciliation flag"
            ),
        }
        Ok(request)
    }

    /// Bring the identity in line with a reviewed request.
    async fn apply_identity_update(
        &self,
        request: &VerificationRequest,
    ) -> Result<Identity, StoreError> {
        let identity = self.store.get_identity(request.identity_id).await?;
        let other_pending = self
            .store
            .list_requests(&RequestFilter {
                identity_id: Some(request.identity_id),
                state: Some(RequestState::Pending),
                needs_reconciliation: None,
            })
            .await?
            .iter()
            .any(|other| other.id != request.id);
        let (role, status) = identity_after_review(&identity, request, other_pending);
        if identity.base_role == role && identity.verification_status == status {
            return Ok(identity);
        }
        self.store
            .set_identity_role(identity.id, role, status)
            .await
    }

    async fn ensure_reviewer(&self, reviewer_id: IdentityId) -> WorkflowResult<()> {
        match self.store.get_identity(reviewer_id).await {
            Ok(reviewer) if reviewer.base_role == Role::Admin => Ok(()),
            Ok(_) | Err(StoreError::NotFound(_)) => Err(WorkflowError::Forbidden(
                "only admins may review verification requests".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

/// Periodically retry flagged reviews. Runs until the task is aborted.
pub async fn run_reconciliation_loop(workflow: VerificationWorkflow, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match workflow.reconcile().await {
            Ok(report) if report.reconciled > 0 || report.remaining > 0 => {
                tracing::info!(
                    reconciled = report.reconciled,
                    remaining = report.remaining,
                    "reconciliation pass finished"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "reconciliation pass failed"),
        }
    }
}

fn review_error(request_id: RequestId, err: StoreError) -> WorkflowError {
    match err {
        StoreError::StaleState(_) => WorkflowError::AlreadyReviewed(request_id),
        err => err.into(),
    }
}
