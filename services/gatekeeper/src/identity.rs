//! Identity lifecycle outside the verification workflow.
//!
//! Identities are created on first successful authentication and only change
//! role through a reviewed verification request or an admin assignment.
use crate::model::{Identity, IdentityId, Role, VerificationStatus, normalize_email};
use crate::store::StoreError;
use crate::workflow::{SharedStore, WorkflowError, WorkflowResult};
use std::collections::HashSet;

#[derive(Clone)]
pub struct IdentityService {
    store: SharedStore,
    initial_admins: HashSet<String>,
}

impl IdentityService {
    pub fn new(store: SharedStore, initial_admins: &[String]) -> Self {
        Self {
            store,
            initial_admins: initial_admins
                .iter()
                .map(|email| normalize_email(email))
                .collect(),
        }
    }

    /// Resolve the identity for an authenticated email, creating it on first use.
    pub async fn authenticate(
        &self,
        email: &str,
        display_name: Option<String>,
    ) -> WorkflowResult<Identity> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(WorkflowError::Invalid("email is not valid".to_string()));
        }
        if let Some(existing) = self.store.find_identity_by_email(&email).await? {
            return Ok(existing);
        }

        let role = if self.initial_admins.contains(&email) {
            Role::Admin
        } else {
            Role::Student
        };
        match self
            .store
            .create_identity(Identity::new(&email, display_name, role))
            .await
        {
            Ok(identity) => {
                metrics::counter!("gatekeeper_identities_created_total", "role" => role.as_str())
                    .increment(1);
                tracing::info!(identity_id = %identity.id, role = %role, "identity created");
                Ok(identity)
            }
            // Lost a race with a concurrent first login for the same email.
            Err(StoreError::Conflict(_)) => self
                .store
                .find_identity_by_email(&email)
                .await?
                .ok_or_else(|| WorkflowError::Conflict("identity email taken".to_string())),
            Err(err) => Err(err.into()),
        }
    }

    /// Admin role assignment. Elevated and admin roles are marked verified.
    pub async fn assign_role(
        &self,
        actor_id: IdentityId,
        identity_id: IdentityId,
        role: Role,
    ) -> WorkflowResult<Identity> {
        match self.store.get_identity(actor_id).await {
            Ok(actor) if actor.base_role == Role::Admin => {}
            Ok(_) | Err(StoreError::NotFound(_)) => {
                return Err(WorkflowError::Forbidden(
                    "only admins may assign roles".to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        }

        let identity = self.store.get_identity(identity_id).await?;
        let status = if role.is_elevated() || role == Role::Admin {
            VerificationStatus::Verified
        } else {
            identity.verification_status
        };
        let updated = self
            .store
            .set_identity_role(identity_id, role, status)
            .await?;
        tracing::info!(
            identity_id = %identity_id,
            actor_id = %actor_id,
            from = %identity.base_role,
            to = %role,
            "identity role assigned"
        );
        Ok(updated)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::sync::Arc;

    fn service() -> IdentityService {
        IdentityService::new(
            Arc::new(InMemoryStore::new()),
            &["Root@Example.com".to_string()],
        )
    }

    #[tokio::test]
    async fn first_login_creates_student_once() {
        let service = service();
        let first = service
            .authenticate("User@Example.com", Some("User".to_string()))
            .await
            .expect("create");
        assert_eq!(first.base_role, Role::Student);
        assert_eq!(first.verification_status, VerificationStatus::Unverified);
        assert_eq!(first.email, "user@example.com");

        let second = service
            .authenticate("user@example.com", None)
            .await
            .expect("lookup");
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn initial_admins_are_created_as_admin() {
        let service = service();
        let admin = service
            .authenticate("root@example.com", None)
            .await
            .expect("admin");
        assert_eq!(admin.base_role, Role::Admin);
        assert!(admin.is_verified());
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let err = service()
            .authenticate("not an email", None)
            .await
            .expect_err("invalid");
        assert!(matches!(err, WorkflowError::Invalid(_)));
    }

    #[tokio::test]
    async fn assign_role_requires_admin_and_keeps_invariant() {
        let service = service();
        let admin = service
            .authenticate("root@example.com", None)
            .await
            .expect("admin");
        let user = service
            .authenticate("user@example.com", None)
            .await
            .expect("user");

        let err = service
            .assign_role(user.id, user.id, Role::Admin)
            .await
            .expect_err("forbidden");
        assert!(matches!(err, WorkflowError::Forbidden(_)));

        let promoted = service
            .assign_role(admin.id, user.id, Role::Instructor)
            .await
            .expect("promote");
        assert_eq!(promoted.base_role, Role::Instructor);
        assert_eq!(promoted.verification_status, VerificationStatus::Verified);

        let demoted = service
            .assign_role(admin.id, user.id, Role::Student)
            .await
            .expect("demote");
        assert_eq!(demoted.base_role, Role::Student);
        assert_eq!(demoted.verification_status, VerificationStatus::Verified);
    }
}
