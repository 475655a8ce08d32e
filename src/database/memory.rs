//! In-memory store implementations used by the test suite. They honor the
//! same contracts as the production stores: unique external IDs with a
//! conflict signal, append-only events, commutative stat deltas, idempotent
//! revocation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Account, AggregateStats, BaselineLandmarkSet, ExternalProfile, Landmark, SessionRecord,
    ViolationEvent,
};

use super::{CredentialStore, Repository};

#[derive(Default)]
pub struct MemoryRepository {
    accounts: RwLock<Vec<Account>>,
    baselines: RwLock<Vec<BaselineLandmarkSet>>,
    events: RwLock<Vec<ViolationEvent>>,
    stats: RwLock<HashMap<(Uuid, NaiveDate), AggregateStats>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>, AppError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().find(|a| a.external_id == external_id).cloned())
    }

    async fn create_account(&self, profile: &ExternalProfile) -> Result<Account, AppError> {
        let mut accounts = self.accounts.write().await;
        if accounts.iter().any(|a| a.external_id == profile.external_id) {
            return Err(AppError::DuplicateAccount(profile.external_id.clone()));
        }

        let account = Account {
            id: Uuid::new_v4(),
            external_id: profile.external_id.clone(),
            provider: profile.provider.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            picture: profile.picture.clone(),
            deviation_threshold: None,
            created_at: Utc::now(),
        };
        accounts.push(account.clone());
        Ok(account)
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn set_deviation_threshold(&self, id: Uuid, threshold: Option<f64>) -> Result<(), AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.iter_mut().find(|a| a.id == id) {
            Some(account) => {
                account.deviation_threshold = threshold;
                Ok(())
            }
            None => Err(AppError::AccountNotFound(id.to_string())),
        }
    }

    async fn get_baseline(&self, account_id: Uuid) -> Result<Option<BaselineLandmarkSet>, AppError> {
        let baselines = self.baselines.read().await;
        Ok(baselines
            .iter()
            .filter(|b| b.account_id == account_id)
            .max_by_key(|b| b.captured_at)
            .cloned())
    }

    async fn put_baseline(
        &self,
        account_id: Uuid,
        landmarks: &[Landmark],
        captured_at: DateTime<Utc>,
    ) -> Result<BaselineLandmarkSet, AppError> {
        let baseline = BaselineLandmarkSet {
            id: Uuid::new_v4(),
            account_id,
            landmarks: landmarks.to_vec(),
            captured_at,
        };
        self.baselines.write().await.push(baseline.clone());
        Ok(baseline)
    }

    async fn append_violation_event(&self, event: &ViolationEvent) -> Result<(), AppError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn events_for_period(
        &self,
        account_id: Uuid,
        period: NaiveDate,
    ) -> Result<Vec<ViolationEvent>, AppError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.account_id == account_id && e.period() == period)
            .cloned()
            .collect())
    }

    async fn get_aggregate_stats(
        &self,
        account_id: Uuid,
        period: NaiveDate,
    ) -> Result<Option<AggregateStats>, AppError> {
        let stats = self.stats.read().await;
        Ok(stats.get(&(account_id, period)).cloned())
    }

    async fn apply_stat_delta(
        &self,
        account_id: Uuid,
        period: NaiveDate,
        score: f64,
    ) -> Result<(), AppError> {
        let mut stats = self.stats.write().await;
        stats
            .entry((account_id, period))
            .or_insert_with(|| AggregateStats::empty(account_id, period))
            .apply(score);
        Ok(())
    }

    async fn replace_aggregate_stats(&self, new_stats: &AggregateStats) -> Result<(), AppError> {
        let mut stats = self.stats.write().await;
        stats.insert((new_stats.account_id, new_stats.period), new_stats.clone());
        Ok(())
    }

    async fn stats_range(
        &self,
        account_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AggregateStats>, AppError> {
        let stats = self.stats.read().await;
        let mut rows: Vec<AggregateStats> = stats
            .values()
            .filter(|s| s.account_id == account_id && s.period >= from && s.period <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.period);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        records.insert(record.token_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<SessionRecord>, AppError> {
        let records = self.records.read().await;
        Ok(records.get(token_id).cloned())
    }

    async fn revoke(&self, token_id: &str) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(token_id) {
            record.revoked = true;
        }
        Ok(())
    }
}
