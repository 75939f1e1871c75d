//! Identity records and their role invariant.
use crate::{AuthzError, AuthzResult, Role, VerificationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Strongly typed ids so identity and request ids cannot be swapped.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = AuthzError;

            fn from_str(input: &str) -> AuthzResult<Self> {
                let uuid =
                    Uuid::parse_str(input).map_err(|_| AuthzError::InvalidId(input.into()))?;
                Ok(Self(uuid))
            }
        }
    };
}

id_type!(IdentityId);
id_type!(RequestId);

/// Canonical user identity with its base role and verification state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    /// Always stored lower-cased.
    pub email: String,
    pub display_name: Option<String>,
    pub base_role: Role,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Build a fresh identity as created on first authentication.
    pub fn new(email: &str, display_name: Option<String>, base_role: Role) -> Self {
        let now = Utc::now();
        let verification_status = if base_role.is_elevated() || base_role == Role::Admin {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        };
        Self {
            id: IdentityId::new(),
            email: normalize_email(email),
            display_name,
            base_role,
            verification_status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }

    /// Elevated roles never sit in `Unverified`.
    pub fn check_invariants(&self) -> AuthzResult<()> {
        if self.base_role.is_elevated()
            && self.verification_status == VerificationStatus::Unverified
        {
            return Err(AuthzError::RoleInvariant {
                id: self.id.to_string(),
                role: self.base_role.to_string(),
                status: self.verification_status.to_string(),
            });
        }
        Ok(())
    }
}

/// Emails compare case-insensitively; the lower-cased form is canonical.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
