pub mod psql;
pub mod redis;

#[cfg(test)]
pub mod memory;

pub use psql::{create_pool, init_schema, DbPool, PgRepository};
pub use redis::{RedisCredentialStore, RedisManager};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Account, AggregateStats, BaselineLandmarkSet, ExternalProfile, Landmark, SessionRecord,
    ViolationEvent,
};

/// Persistence capability for accounts, baselines, violation events and
/// aggregate statistics. The rest of the crate never issues raw queries;
/// everything goes through this seam, which also makes the core testable
/// against an in-memory implementation.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>, AppError>;

    /// Create an account for a first federated login. Uniqueness of
    /// `external_id` is enforced by the store; a concurrent-creation loser
    /// gets `DuplicateAccount` and is expected to re-read the winner's row.
    async fn create_account(&self, profile: &ExternalProfile) -> Result<Account, AppError>;

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError>;

    async fn set_deviation_threshold(&self, id: Uuid, threshold: Option<f64>) -> Result<(), AppError>;

    /// Current baseline: the most recently captured row. History is retained.
    async fn get_baseline(&self, account_id: Uuid) -> Result<Option<BaselineLandmarkSet>, AppError>;

    async fn put_baseline(
        &self,
        account_id: Uuid,
        landmarks: &[Landmark],
        captured_at: DateTime<Utc>,
    ) -> Result<BaselineLandmarkSet, AppError>;

    async fn append_violation_event(&self, event: &ViolationEvent) -> Result<(), AppError>;

    async fn events_for_period(
        &self,
        account_id: Uuid,
        period: NaiveDate,
    ) -> Result<Vec<ViolationEvent>, AppError>;

    async fn get_aggregate_stats(
        &self,
        account_id: Uuid,
        period: NaiveDate,
    ) -> Result<Option<AggregateStats>, AppError>;

    /// Fold one violation score into the stats row for the period.
    /// Addition-only upsert, so concurrent applications commute.
    async fn apply_stat_delta(
        &self,
        account_id: Uuid,
        period: NaiveDate,
        score: f64,
    ) -> Result<(), AppError>;

    /// Overwrite the stats row with a replay-derived value.
    async fn replace_aggregate_stats(&self, stats: &AggregateStats) -> Result<(), AppError>;

    async fn stats_range(
        &self,
        account_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AggregateStats>, AppError>;
}

/// Issued-credential state: one record per token, keyed by `jti`.
/// Verification always consults this store; no cache sits in front of it,
/// so a returned revocation is immediately visible.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn put(&self, record: &SessionRecord) -> Result<(), AppError>;

    async fn get(&self, token_id: &str) -> Result<Option<SessionRecord>, AppError>;

    /// Mark a credential revoked. Idempotent; revoking an unknown or
    /// already-revoked token is a no-op.
    async fn revoke(&self, token_id: &str) -> Result<(), AppError>;
}
