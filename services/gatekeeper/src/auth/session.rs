//! Session token minting and verification.
//!
//! # Purpose
//! Issues HS256 JWTs naming an identity and validates them on every request.
//!
//! # Key invariants
//! - Tokens carry `iss`, `sub`, `iat`, and `exp` only. No role or status is
//!   embedded, so a role change takes effect on the next request.
//! - Only HS256 is accepted; the algorithm in the token header is not trusted.
//!
//! # Security considerations
//! - The shared secret must never be logged.
//! - Expiry is checked without leeway.
//!
//! # Examples
//! ```rust
//! use campus_authz::IdentityId;
//! use gatekeeper::auth::session::SessionIssuer;
//! use std::time::Duration;
//!
//! let issuer = SessionIssuer::new(
//!     "0123456789abcdef0123456789abcdef",
//!     "campus-gatekeeper",
//!     Duration::from_secs(60),
//! );
//! let identity = IdentityId::new();
//! let session = issuer.mint(identity).expect("mint");
//! assert_eq!(issuer.verify(&session.token).expect("verify"), identity);
//! ```
use campus_authz::IdentityId;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session token expired")]
    Expired,
    #[error("invalid session token: {0}")]
    Invalid(String),
    #[error("failed to sign session token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(secret: &str, issuer: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn mint(&self, identity_id: IdentityId) -> Result<IssuedSession, SessionError> {
        self.mint_at(identity_id, Utc::now())
    }

    fn mint_at(
        &self,
        identity_id: IdentityId,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|err| SessionError::Invalid(err.to_string()))?;
        let expires_at = issued_at + ttl;
        let claims = SessionClaims {
            iss: self.issuer.clone(),
            sub: identity_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(SessionError::Signing)?;
        Ok(IssuedSession { token, expires_at })
    }

    /// Validate signature, issuer and expiry; return the identity named by `sub`.
    pub fn verify(&self, token: &str) -> Result<IdentityId, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid(err.to_string()),
            })?;
        data.claims
            .sub
            .parse::<IdentityId>()
            .map_err(|err| SessionError::Invalid(err.to_string()))
    }
}
