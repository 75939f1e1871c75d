//! Declarative route access table.
//!
//! # Purpose
//! Holds the ordered list of protected path prefixes and resolves the rule
//! that applies to a request path.
//!
//! # Key invariants
//! - Prefixes are stored in canonical form (see [`crate::normalize_path`]).
//! - At most one rule per prefix.
//! - The longest matching prefix wins; unmatched paths are public.
use crate::path::{normalize_path, path_has_prefix};
use crate::{AuthzError, AuthzResult, Role};
use serde::{Deserialize, Serialize};

/// One protected (or explicitly re-opened) path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub prefix: String,
    /// Roles allowed under this prefix; empty means any authenticated identity.
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub requires_verified: bool,
    /// Re-opens a sub-tree of a protected prefix to everyone.
    #[serde(default)]
    pub public: bool,
}

impl AccessRule {
    pub fn authenticated(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            roles: Vec::new(),
            requires_verified: false,
            public: false,
        }
    }

    pub fn for_roles(prefix: &str, roles: &[Role]) -> Self {
        Self {
            roles: roles.to_vec(),
            ..Self::authenticated(prefix)
        }
    }

    pub fn public(prefix: &str) -> Self {
        Self {
            public: true,
            ..Self::authenticated(prefix)
        }
    }

    pub fn verified(mut self) -> Self {
        self.requires_verified = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    // Sorted by descending prefix length so the first hit is the most specific.
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new(rules: Vec<AccessRule>) -> AuthzResult<Self> {
        let mut canonical: Vec<AccessRule> = Vec::with_capacity(rules.len());
        for mut rule in rules {
            if !rule.prefix.starts_with('/') {
                return Err(AuthzError::InvalidPrefix(rule.prefix));
            }
            rule.prefix = normalize_path(&rule.prefix);
            if canonical.iter().any(|existing| existing.prefix == rule.prefix) {
                return Err(AuthzError::DuplicateRule(rule.prefix));
            }
            canonical.push(rule);
        }
        canonical.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { rules: canonical })
    }

    /// Route table for the Campus platform pages and the gatekeeper API.
    pub fn platform_default() -> Self {
        let mut rules = vec![
            AccessRule::for_roles("/admin", &[Role::Admin]),
            AccessRule::for_roles("/recruiter", &[Role::Recruiter]).verified(),
            AccessRule::for_roles("/instructor", &[Role::Instructor]).verified(),
            AccessRule::for_roles("/student", &[Role::Student]),
            AccessRule::authenticated("/dashboard"),
            AccessRule::authenticated("/settings"),
            AccessRule::authenticated("/messages"),
            AccessRule::authenticated("/notifications"),
            AccessRule::authenticated("/verification"),
            AccessRule::public("/verification/faq"),
            AccessRule::for_roles("/v1/admin", &[Role::Admin]),
            AccessRule::authenticated("/v1/verification"),
            AccessRule::authenticated("/v1/identities"),
        ];
        // Entries are written in canonical form and are unique.
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { rules }
    }

    /// Resolve the most specific rule for an already-canonical path.
    pub fn lookup(&self, canonical_path: &str) -> Option<&AccessRule> {
        self.rules
            .iter()
            .find(|rule| path_has_prefix(canonical_path, &rule.prefix))
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
