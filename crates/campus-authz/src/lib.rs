//! Campus role and route-access primitives shared by the gatekeeper service.
//!
//! # Purpose
//! Centralizes the identity model (base role plus verification state), the
//! declarative route access table, path canonicalization and the pure policy
//! evaluator that turns `(identity, path)` into an access decision.
//!
//! # Key invariants
//! - `Recruiter` and `Instructor` identities are never `Unverified`.
//! - Paths are canonicalized before matching; longest prefix wins.
//! - Evaluation performs no I/O.
//!
//! # Examples
//! ```rust
//! use campus_authz::{AccessPolicy, Decision, PolicyEvaluator};
//!
//! let evaluator = PolicyEvaluator::new(AccessPolicy::platform_default());
//! assert_eq!(
//!     evaluator.evaluate(None, "/admin/users"),
//!     Decision::DenyRedirect("/login?redirect=%2Fadmin%2Fusers".to_string())
//! );
//! ```

mod errors;
mod evaluator;
mod identity;
mod path;
mod policy;
mod role;

pub use errors::{AuthzError, AuthzResult};
pub use evaluator::{Decision, EvaluatorConfig, PolicyEvaluator, UnverifiedAccess};
pub use identity::{Identity, IdentityId, RequestId, normalize_email};
pub use path::{normalize_path, path_has_prefix, split_query};
pub use policy::{AccessPolicy, AccessRule};
pub use role::{Role, TargetRole, VerificationStatus};
