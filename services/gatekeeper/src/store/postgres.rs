//! Postgres-backed implementation of the gatekeeper store.
//!
//! # What this module is
//! Durable storage for identities and verification requests using `sqlx`.
//! Two tables, `identities` and `verification_requests`, related by
//! `identity_id`.
//!
//! # Key invariants
//! - A partial unique index on `(identity_id, target_role) WHERE state =
//!   'pending'` backs the one-pending-request rule, so concurrent submissions
//!   cannot both succeed even across gatekeeper instances.
//! - Reviews are `UPDATE ... WHERE state = 'pending'`; Postgres row locking
//!   turns two racing reviews into one update and one zero-row result.
//! - `submit_request` and `commit_review` run in a single transaction, so the
//!   request row and the identity row change together or not at all.
//! - Lock order is identity row first, then request rows. Every transaction
//!   that touches both follows it, so reviews and resubmissions for the same
//!   identity serialize instead of deadlocking.
//! - A `CHECK` constraint keeps recruiter/instructor identities out of
//!   `unverified`.
//!
//! # Security notes
//! - Database URLs may contain credentials; never log `PostgresConfig::url`.
//! - All SQL is static; user input is only ever bound as parameters.
//!
//! # Operational notes
//! Migrations run at startup via `sqlx::migrate!("./migrations")` so handlers
//! can assume the schema exists. Pool timeouts are explicit so a stalled
//! database surfaces as [`StoreError::Unavailable`] instead of hanging.
use super::{GatekeeperStore, IdentityStore, StoreError, StoreResult, VerificationStore};
use crate::config::PostgresConfig;
use crate::model::{
    Identity, IdentityId, RequestFilter, RequestId, RequestState, ReviewCommit, Role, TargetRole,
    VerificationRequest, VerificationStatus, check_review, check_submission,
    identity_after_review,
};
use async_trait::async_trait;
use campus_authz::normalize_email;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const IDENTITY_COLUMNS: &str =
    "id, email, display_name, base_role, verification_status, created_at, updated_at";
const REQUEST_COLUMNS: &str = "id, identity_id, target_role, state, payload, submitted_at, \
     reviewed_at, reviewer_id, rejection_reason, needs_reconciliation";

/// Durable gatekeeper store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use gatekeeper::config::PostgresConfig;
/// use gatekeeper::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

/// Row shape for `identities`.
#[derive(Debug, Clone, FromRow)]
struct DbIdentity {
    id: Uuid,
    email: String,
    display_name: Option<String>,
    base_role: String,
    verification_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row shape for `verification_requests`.
#[derive(Debug, Clone, FromRow)]
struct DbRequest {
    id: Uuid,
    identity_id: Uuid,
    target_role: String,
    state: String,
    payload: serde_json::Value,
    submitted_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewer_id: Option<Uuid>,
    rejection_reason: Option<String>,
    needs_reconciliation: bool,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.into()),
            other => StoreError::Unexpected(other.into()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl PostgresStore {
    /// Connect, size the pool, and apply migrations.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    /// Connect without running migrations; tests manage the schema themselves.
    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| {
                StoreError::Unavailable(anyhow::anyhow!("timed out connecting to postgres"))
            })??;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        Ok(Self { pool })
    }

    async fn lock_identity(
        tx: &mut Transaction<'_, Postgres>,
        id: IdentityId,
    ) -> StoreResult<Identity> {
        let row = sqlx::query_as::<_, DbIdentity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("identity".into()))?;
        identity_from_db(row)
    }

    /// CAS a pending request to its terminal state inside `executor`.
    ///
    /// `flag` is written to `needs_reconciliation` by the same statement.
    async fn transition_in<'e, E>(
        executor: E,
        commit: &ReviewCommit,
        flag: bool,
    ) -> StoreResult<Option<DbRequest>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, DbRequest>(&format!(
            "UPDATE verification_requests \
             SET state = $2, reviewed_at = $3, reviewer_id = $4, rejection_reason = $5, \
                 needs_reconciliation = $6 \
             WHERE id = $1 AND state = 'pending' \
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(commit.request_id.as_uuid())
        .bind(commit.outcome.as_str())
        .bind(commit.reviewed_at)
        .bind(commit.reviewer_id.as_uuid())
        .bind(commit.reason.as_deref())
        .bind(flag)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Explain a zero-row review update: unknown id or already reviewed.
    async fn missing_transition<'e, E>(executor: E, id: RequestId) -> StoreError
    where
        E: sqlx::PgExecutor<'e>,
    {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM verification_requests WHERE id = $1)",
        )
        .bind(id.as_uuid())
        .fetch_one(executor)
        .await;
        match exists {
            Ok(true) => StoreError::StaleState("request already reviewed".into()),
            Ok(false) => StoreError::NotFound("verification request".into()),
            Err(err) => err.into(),
        }
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    async fn create_identity(&self, identity: Identity) -> StoreResult<Identity> {
        identity
            .check_invariants()
            .map_err(|err| StoreError::Conflict(err.to_string()))?;
        let insert = sqlx::query(
            "INSERT INTO identities \
             (id, email, display_name, base_role, verification_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(identity.id.as_uuid())
        .bind(&identity.email)
        .bind(identity.display_name.as_deref())
        .bind(identity.base_role.as_str())
        .bind(identity.verification_status.as_str())
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&self.pool)
        .await;
        match insert {
            Ok(_) => Ok(identity),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict("email already registered".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_identity(&self, id: IdentityId) -> StoreResult<Identity> {
        let row = sqlx::query_as::<_, DbIdentity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("identity".into()))?;
        identity_from_db(row)
    }

    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, DbIdentity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE LOWER(email) = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        row.map(identity_from_db).transpose()
    }

    async fn set_identity_role(
        &self,
        id: IdentityId,
        role: Role,
        status: VerificationStatus,
    ) -> StoreResult<Identity> {
        let mut tx = self.pool.begin().await?;
        let mut identity = Self::lock_identity(&mut tx, id).await?;
        identity.base_role = role;
        identity.verification_status = status;
        identity.updated_at = Utc::now();
        identity
            .check_invariants()
            .map_err(|err| StoreError::Conflict(err.to_string()))?;
        update_identity(&mut tx, &identity).await?;
        tx.commit().await?;
        Ok(identity)
    }
}

#[async_trait]
impl VerificationStore for PostgresStore {
    async fn submit_request(
        &self,
        request: VerificationRequest,
    ) -> StoreResult<VerificationRequest> {
        let mut tx = self.pool.begin().await?;
        let mut identity = Self::lock_identity(&mut tx, request.identity_id).await?;
        check_submission(&identity)?;

        let insert = sqlx::query(
            "INSERT INTO verification_requests \
             (id, identity_id, target_role, state, payload, submitted_at, needs_reconciliation) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE)",
        )
        .bind(request.id.as_uuid())
        .bind(request.identity_id.as_uuid())
        .bind(request.target_role.as_str())
        .bind(request.state.as_str())
        .bind(&request.payload)
        .bind(request.submitted_at)
        .execute(&mut *tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("pending request exists".into()));
            }
            return Err(err.into());
        }

        identity.verification_status = VerificationStatus::Pending;
        identity.updated_at = Utc::now();
        update_identity(&mut tx, &identity).await?;
        tx.commit().await?;
        Ok(request)
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<VerificationRequest> {
        let row = sqlx::query_as::<_, DbRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM verification_requests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("verification request".into()))?;
        request_from_db(row)
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> StoreResult<Vec<VerificationRequest>> {
        let rows = sqlx::query_as::<_, DbRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM verification_requests \
             WHERE ($1::uuid IS NULL OR identity_id = $1) \
               AND ($2::text IS NULL OR state = $2) \
               AND ($3::bool IS NULL OR needs_reconciliation = $3) \
             ORDER BY seq"
        ))
        .bind(filter.identity_id.map(|id| id.as_uuid()))
        .bind(filter.state.map(|state| state.as_str()))
        .bind(filter.needs_reconciliation)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(request_from_db).collect()
    }

    async fn latest_request(
        &self,
        identity_id: IdentityId,
        target_role: TargetRole,
    ) -> StoreResult<Option<VerificationRequest>> {
        let row = sqlx::query_as::<_, DbRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM verification_requests \
             WHERE identity_id = $1 AND target_role = $2 \
             ORDER BY seq DESC LIMIT 1"
        ))
        .bind(identity_id.as_uuid())
        .bind(target_role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(request_from_db).transpose()
    }

    async fn transition_request(&self, commit: &ReviewCommit) -> StoreResult<VerificationRequest> {
        match Self::transition_in(&self.pool, commit, true).await? {
            Some(row) => request_from_db(row),
            None => Err(Self::missing_transition(&self.pool, commit.request_id).await),
        }
    }

    async fn commit_review(
        &self,
        commit: &ReviewCommit,
    ) -> StoreResult<(VerificationRequest, Identity)> {
        let mut tx = self.pool.begin().await?;
        let identity_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT identity_id FROM verification_requests WHERE id = $1",
        )
        .bind(commit.request_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("verification request".into()))?;

        let mut identity =
            Self::lock_identity(&mut tx, IdentityId::from_uuid(identity_id)).await?;
        let reviewed = match Self::transition_in(&mut *tx, commit, false).await? {
            Some(row) => request_from_db(row)?,
            None => return Err(Self::missing_transition(&mut *tx, commit.request_id).await),
        };
        // Dropping `tx` rolls the transition back.
        check_review(&identity, commit).map_err(StoreError::Conflict)?;

        let other_pending = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM verification_requests \
             WHERE identity_id = $1 AND id <> $2 AND state = 'pending')",
        )
        .bind(reviewed.identity_id.as_uuid())
        .bind(reviewed.id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let (role, status) = identity_after_review(&identity, &reviewed, other_pending);
        identity.base_role = role;
        identity.verification_status = status;
        identity.updated_at = Utc::now();
        update_identity(&mut tx, &identity).await?;

        tx.commit().await?;
        Ok((reviewed, identity))
    }

    async fn set_reconciliation_flag(&self, id: RequestId, flag: bool) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE verification_requests SET needs_reconciliation = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(flag)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("verification request".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl GatekeeperStore for PostgresStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

async fn update_identity(
    tx: &mut Transaction<'_, Postgres>,
    identity: &Identity,
) -> StoreResult<()> {
    sqlx::query(
        "UPDATE identities SET base_role = $2, verification_status = $3, updated_at = $4 \
         WHERE id = $1",
    )
    .bind(identity.id.as_uuid())
    .bind(identity.base_role.as_str())
    .bind(identity.verification_status.as_str())
    .bind(identity.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn identity_from_db(row: DbIdentity) -> StoreResult<Identity> {
    Ok(Identity {
        id: IdentityId::from_uuid(row.id),
        email: row.email,
        display_name: row.display_name,
        base_role: Role::from_str(&row.base_role).map_err(|err| anyhow::anyhow!(err))?,
        verification_status: VerificationStatus::from_str(&row.verification_status)
            .map_err(|err| anyhow::anyhow!(err))?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn request_from_db(row: DbRequest) -> StoreResult<VerificationRequest> {
    Ok(VerificationRequest {
        id: RequestId::from_uuid(row.id),
        identity_id: IdentityId::from_uuid(row.identity_id),
        target_role: TargetRole::from_str(&row.target_role).map_err(|err| anyhow::anyhow!(err))?,
        state: RequestState::from_str(&row.state).map_err(|err| anyhow::anyhow!(err))?,
        payload: row.payload,
        submitted_at: row.submitted_at,
        reviewed_at: row.reviewed_at,
        reviewer_id: row.reviewer_id.map(IdentityId::from_uuid),
        rejection_reason: row.rejection_reason,
        needs_reconciliation: row.needs_reconciliation,
    })
}
