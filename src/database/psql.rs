use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    Account, AggregateStats, BaselineLandmarkSet, ExternalProfile, Landmark, ViolationEvent,
};

use super::Repository;

pub type DbPool = Pool<Postgres>;

pub async fn create_pool(config: &Config) -> Result<DbPool, sqlx::Error> {
    PgPool::connect(&config.database_url).await
}

/// Idempotent schema bootstrap, run once at startup.
pub async fn init_schema(pool: &DbPool) -> Result<(), AppError> {
    const STATEMENTS: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id UUID PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            provider TEXT NOT NULL,
            email TEXT NOT NULL,
            display_name TEXT,
            picture TEXT,
            deviation_threshold DOUBLE PRECISION,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS baselines (
            id UUID PRIMARY KEY,
            account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            landmarks JSONB NOT NULL,
            captured_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS baselines_account_captured_idx
            ON baselines (account_id, captured_at DESC)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS violation_events (
            id UUID PRIMARY KEY,
            account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            session_id TEXT,
            detected_at TIMESTAMPTZ NOT NULL,
            deviation_score DOUBLE PRECISION NOT NULL,
            landmarks JSONB NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS violation_events_account_detected_idx
            ON violation_events (account_id, detected_at)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS aggregate_stats (
            account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            period DATE NOT NULL,
            violation_count BIGINT NOT NULL DEFAULT 0,
            score_sum DOUBLE PRECISION NOT NULL DEFAULT 0,
            score_sum_squares DOUBLE PRECISION NOT NULL DEFAULT 0,
            PRIMARY KEY (account_id, period)
        )
        "#,
    ];

    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Postgres-backed repository.
#[derive(Clone)]
pub struct PgRepository {
    pool: DbPool,
}

impl PgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BaselineRow {
    id: Uuid,
    account_id: Uuid,
    landmarks: Json<Vec<Landmark>>,
    captured_at: DateTime<Utc>,
}

impl From<BaselineRow> for BaselineLandmarkSet {
    fn from(row: BaselineRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            landmarks: row.landmarks.0,
            captured_at: row.captured_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ViolationEventRow {
    id: Uuid,
    account_id: Uuid,
    session_id: Option<String>,
    detected_at: DateTime<Utc>,
    deviation_score: f64,
    landmarks: Json<Vec<Landmark>>,
}

impl From<ViolationEventRow> for ViolationEvent {
    fn from(row: ViolationEventRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            session_id: row.session_id,
            detected_at: row.detected_at,
            deviation_score: row.deviation_score,
            landmarks: row.landmarks.0,
        }
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, external_id, provider, email, display_name, picture, deviation_threshold, created_at";

#[async_trait]
impl Repository for PgRepository {
    async fn find_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE external_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn create_account(&self, profile: &ExternalProfile) -> Result<Account, AppError> {
        // ON CONFLICT DO NOTHING returns no row when another process won the
        // creation race; the caller re-reads the winner's row.
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (id, external_id, provider, email, display_name, picture, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&profile.external_id)
        .bind(&profile.provider)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.picture)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        account.ok_or_else(|| AppError::DuplicateAccount(profile.external_id.clone()))
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn set_deviation_threshold(&self, id: Uuid, threshold: Option<f64>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE accounts SET deviation_threshold = $2 WHERE id = $1")
            .bind(id)
            .bind(threshold)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::AccountNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_baseline(&self, account_id: Uuid) -> Result<Option<BaselineLandmarkSet>, AppError> {
        let row = sqlx::query_as::<_, BaselineRow>(
            r#"
            SELECT id, account_id, landmarks, captured_at
            FROM baselines
            WHERE account_id = $1
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BaselineLandmarkSet::from))
    }

    async fn put_baseline(
        &self,
        account_id: Uuid,
        landmarks: &[Landmark],
        captured_at: DateTime<Utc>,
    ) -> Result<BaselineLandmarkSet, AppError> {
        let row = sqlx::query_as::<_, BaselineRow>(
            r#"
            INSERT INTO baselines (id, account_id, landmarks, captured_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, account_id, landmarks, captured_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(Json(landmarks.to_vec()))
        .bind(captured_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn append_violation_event(&self, event: &ViolationEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO violation_events (id, account_id, session_id, detected_at, deviation_score, landmarks)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(event.account_id)
        .bind(&event.session_id)
        .bind(event.detected_at)
        .bind(event.deviation_score)
        .bind(Json(event.landmarks.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn events_for_period(
        &self,
        account_id: Uuid,
        period: NaiveDate,
    ) -> Result<Vec<ViolationEvent>, AppError> {
        let rows = sqlx::query_as::<_, ViolationEventRow>(
            r#"
            SELECT id, account_id, session_id, detected_at, deviation_score, landmarks
            FROM violation_events
            WHERE account_id = $1 AND (detected_at AT TIME ZONE 'UTC')::date = $2
            ORDER BY detected_at
            "#,
        )
        .bind(account_id)
        .bind(period)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ViolationEvent::from).collect())
    }

    async fn get_aggregate_stats(
        &self,
        account_id: Uuid,
        period: NaiveDate,
    ) -> Result<Option<AggregateStats>, AppError> {
        let stats = sqlx::query_as::<_, AggregateStats>(
            r#"
            SELECT account_id, period, violation_count, score_sum, score_sum_squares
            FROM aggregate_stats
            WHERE account_id = $1 AND period = $2
            "#,
        )
        .bind(account_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn apply_stat_delta(
        &self,
        account_id: Uuid,
        period: NaiveDate,
        score: f64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO aggregate_stats (account_id, period, violation_count, score_sum, score_sum_squares)
            VALUES ($1, $2, 1, $3, $3 * $3)
            ON CONFLICT (account_id, period) DO UPDATE SET
                violation_count = aggregate_stats.violation_count + 1,
                score_sum = aggregate_stats.score_sum + EXCLUDED.score_sum,
                score_sum_squares = aggregate_stats.score_sum_squares + EXCLUDED.score_sum_squares
            "#,
        )
        .bind(account_id)
        .bind(period)
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_aggregate_stats(&self, stats: &AggregateStats) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO aggregate_stats (account_id, period, violation_count, score_sum, score_sum_squares)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_id, period) DO UPDATE SET
                violation_count = EXCLUDED.violation_count,
                score_sum = EXCLUDED.score_sum,
                score_sum_squares = EXCLUDED.score_sum_squares
            "#,
        )
        .bind(stats.account_id)
        .bind(stats.period)
        .bind(stats.violation_count)
        .bind(stats.score_sum)
        .bind(stats.score_sum_squares)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stats_range(
        &self,
        account_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AggregateStats>, AppError> {
        let rows = sqlx::query_as::<_, AggregateStats>(
            r#"
            SELECT account_id, period, violation_count, score_sum, score_sum_squares
            FROM aggregate_stats
            WHERE account_id = $1 AND period >= $2 AND period <= $3
            ORDER BY period
            "#,
        )
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
