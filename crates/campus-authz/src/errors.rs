use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("role cannot be requested through verification: {0}")]
    InvalidTargetRole(String),
    #[error("invalid verification status: {0}")]
    InvalidStatus(String),
    #[error("invalid identity id: {0}")]
    InvalidId(String),
    #[error("invalid access rule prefix: {0}")]
    InvalidPrefix(String),
    #[error("duplicate access rule for prefix {0}")]
    DuplicateRule(String),
    #[error("identity {id} violates role invariant: {role} cannot be {status}")]
    RoleInvariant {
        id: String,
        role: String,
        status: String,
    },
}

pub type AuthzResult<T> = Result<T, AuthzError>;
