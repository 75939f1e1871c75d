//! Pure access decision over an identity and a request path.
//!
//! # Key invariants
//! - No I/O and no mutation; the same inputs always yield the same decision.
//! - Unmatched paths are allowed; only listed prefixes are protected.
//! - A missing identity and a `Guest` identity are treated alike.
use crate::path::normalize_path;
use crate::{AccessPolicy, AccessRule, Identity, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Redirect the caller to the contained target (path plus query).
    DenyRedirect(String),
    DenyForbidden,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::DenyRedirect(_) => "redirect",
            Decision::DenyForbidden => "forbidden",
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// How verified-only prefixes treat identities whose status is not `Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnverifiedAccess {
    /// Deny with 403.
    #[default]
    Forbid,
    /// Send the caller to the verification page instead.
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorConfig {
    pub login_path: String,
    pub verification_path: String,
    pub unverified_access: UnverifiedAccess,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            verification_path: "/verification".to_string(),
            unverified_access: UnverifiedAccess::Forbid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    policy: AccessPolicy,
    config: EvaluatorConfig,
}

impl PolicyEvaluator {
    pub fn new(policy: AccessPolicy) -> Self {
        Self::with_config(policy, EvaluatorConfig::default())
    }

    pub fn with_config(policy: AccessPolicy, config: EvaluatorConfig) -> Self {
        Self { policy, config }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Decide whether `identity` may reach `resource_path`.
    ///
    /// `resource_path` is the request target as received (path plus optional
    /// query); it is canonicalized for matching and echoed verbatim into the
    /// login redirect.
    pub fn evaluate(&self, identity: Option<&Identity>, resource_path: &str) -> Decision {
        let canonical = normalize_path(resource_path);
        let Some(rule) = self.policy.lookup(&canonical) else {
            return Decision::Allow;
        };
        if rule.public {
            return Decision::Allow;
        }

        let identity = match identity {
            Some(identity) if identity.base_role != Role::Guest => identity,
            _ => return Decision::DenyRedirect(self.login_redirect(resource_path)),
        };

        if !role_allowed(rule, identity.base_role) {
            return Decision::DenyForbidden;
        }

        if rule.requires_verified && identity.base_role != Role::Admin && !identity.is_verified()
        {
            return match self.config.unverified_access {
                UnverifiedAccess::Forbid => Decision::DenyForbidden,
                UnverifiedAccess::Redirect => {
                    Decision::DenyRedirect(self.config.verification_path.clone())
                }
            };
        }

        Decision::Allow
    }

    fn login_redirect(&self, resource_path: &str) -> String {
        let original = resource_path.split('#').next().unwrap_or_default();
        let original = if original.is_empty() { "/" } else { original };
        format!(
            "{}?redirect={}",
            self.config.login_path,
            urlencoding::encode(original)
        )
    }
}

fn role_allowed(rule: &AccessRule, role: Role) -> bool {
    rule.roles.is_empty() || rule.roles.iter().any(|required| role.satisfies(*required))
}
