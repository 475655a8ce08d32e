use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::Repository;
use crate::errors::AppError;
use crate::models::{AggregateStats, DeviationResult, Landmark, ViolationEvent};

/// Persists violation events and keeps the per-day aggregate statistics
/// current.
///
/// Events are append-only and written before their statistics delta, so a
/// stats row can always be reproduced by replaying the period's events. The
/// delta itself is addition-only (count, sum, sum of squares), which makes
/// concurrent updates commute.
pub struct EventRecorder {
    repository: Arc<dyn Repository>,
}

impl EventRecorder {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Record one violating sample as exactly one event, then fold its score
    /// into the aggregate for the event's UTC day.
    pub async fn record(
        &self,
        account_id: Uuid,
        session_id: Option<String>,
        result: &DeviationResult,
        landmarks: &[Landmark],
        detected_at: DateTime<Utc>,
    ) -> Result<ViolationEvent, AppError> {
        if !result.is_violation {
            return Err(AppError::bad_request("Only violating samples are recorded"));
        }

        let event = ViolationEvent::new(
            account_id,
            session_id,
            detected_at,
            result.score,
            landmarks.to_vec(),
        );

        // Durable event first; the stats update is only applied afterwards.
        self.repository.append_violation_event(&event).await?;
        self.repository
            .apply_stat_delta(account_id, event.period(), result.score)
            .await?;

        tracing::debug!(
            account_id = %account_id,
            score = result.score,
            "Recorded posture violation"
        );

        Ok(event)
    }

    /// Recompute the aggregate for a period by replaying its events, and
    /// replace the stored row with the result.
    ///
    /// Because the incremental path folds the same sufficient statistics,
    /// the replayed value matches it within floating-point tolerance no
    /// matter how the events' writes were interleaved.
    pub async fn rebuild_stats(
        &self,
        account_id: Uuid,
        period: NaiveDate,
    ) -> Result<AggregateStats, AppError> {
        let events = self.repository.events_for_period(account_id, period).await?;
        let stats = fold_events(account_id, period, &events);
        self.repository.replace_aggregate_stats(&stats).await?;
        Ok(stats)
    }
}

fn fold_events(account_id: Uuid, period: NaiveDate, events: &[ViolationEvent]) -> AggregateStats {
    let mut stats = AggregateStats::empty(account_id, period);
    for event in events {
        stats.apply(event.deviation_score);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryRepository;

    fn violation(score: f64) -> DeviationResult {
        DeviationResult {
            score,
            is_violation: true,
            threshold: 1.0,
        }
    }

    fn landmarks() -> Vec<Landmark> {
        vec![Landmark::new(2.0, 0.0)]
    }

    #[tokio::test]
    async fn conforming_samples_are_never_recorded() {
        let recorder = EventRecorder::new(Arc::new(MemoryRepository::new()));
        let conforming = DeviationResult {
            score: 0.5,
            is_violation: false,
            threshold: 1.0,
        };

        let result = recorder
            .record(Uuid::new_v4(), None, &conforming, &landmarks(), Utc::now())
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn each_violation_yields_exactly_one_event() {
        let repository = Arc::new(MemoryRepository::new());
        let recorder = EventRecorder::new(repository.clone());
        let account_id = Uuid::new_v4();
        let now = Utc::now();

        recorder
            .record(account_id, Some("jti-1".to_string()), &violation(2.0), &landmarks(), now)
            .await
            .unwrap();

        let events = repository.events_for_period(account_id, now.date_naive()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id.as_deref(), Some("jti-1"));
        assert!((events[0].deviation_score - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn incremental_stats_match_replayed_rebuild() {
        let repository = Arc::new(MemoryRepository::new());
        let recorder = EventRecorder::new(repository.clone());
        let account_id = Uuid::new_v4();
        let now = Utc::now();
        let period = now.date_naive();

        let scores = [1.5, 2.25, 3.0, 4.75, 2.5, 1.125];
        for score in scores {
            recorder
                .record(account_id, None, &violation(score), &landmarks(), now)
                .await
                .unwrap();
        }

        let incremental = repository
            .get_aggregate_stats(account_id, period)
            .await
            .unwrap()
            .unwrap();
        let rebuilt = recorder.rebuild_stats(account_id, period).await.unwrap();

        assert_eq!(incremental.violation_count, rebuilt.violation_count);
        assert!((incremental.score_sum - rebuilt.score_sum).abs() < 1e-9);
        assert!((incremental.score_sum_squares - rebuilt.score_sum_squares).abs() < 1e-9);
    }

    #[tokio::test]
    async fn concurrent_recordings_converge_to_the_replayed_value() {
        let repository = Arc::new(MemoryRepository::new());
        let recorder = Arc::new(EventRecorder::new(repository.clone()));
        let account_id = Uuid::new_v4();
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let recorder = recorder.clone();
            let score = 1.0 + f64::from(i) * 0.25;
            handles.push(tokio::spawn(async move {
                recorder
                    .record(account_id, None, &violation(score), &[Landmark::new(score, 0.0)], now)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let incremental = repository
            .get_aggregate_stats(account_id, now.date_naive())
            .await
            .unwrap()
            .unwrap();
        let rebuilt = recorder.rebuild_stats(account_id, now.date_naive()).await.unwrap();

        assert_eq!(incremental.violation_count, 16);
        assert!((incremental.score_sum - rebuilt.score_sum).abs() < 1e-9);
        assert!((incremental.score_sum_squares - rebuilt.score_sum_squares).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rebuild_of_an_empty_period_yields_zeroed_stats() {
        let recorder = EventRecorder::new(Arc::new(MemoryRepository::new()));
        let period = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let stats = recorder.rebuild_stats(Uuid::new_v4(), period).await.unwrap();
        assert_eq!(stats.violation_count, 0);
        assert_eq!(stats.mean_score(), None);
    }

    #[tokio::test]
    async fn events_aggregate_under_their_own_day() {
        let repository = Arc::new(MemoryRepository::new());
        let recorder = EventRecorder::new(repository.clone());
        let account_id = Uuid::new_v4();

        let today = Utc::now();
        let yesterday = today - chrono::Duration::days(1);

        recorder
            .record(account_id, None, &violation(2.0), &landmarks(), today)
            .await
            .unwrap();
        recorder
            .record(account_id, None, &violation(4.0), &landmarks(), yesterday)
            .await
            .unwrap();

        let today_stats = repository
            .get_aggregate_stats(account_id, today.date_naive())
            .await
            .unwrap()
            .unwrap();
        let yesterday_stats = repository
            .get_aggregate_stats(account_id, yesterday.date_naive())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(today_stats.violation_count, 1);
        assert!((today_stats.score_sum - 2.0).abs() < f64::EPSILON);
        assert_eq!(yesterday_stats.violation_count, 1);
        assert!((yesterday_stats.score_sum - 4.0).abs() < f64::EPSILON);
    }
}
