use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single posture landmark in the capture device's unit space.
///
/// `z` is optional: depth-less capture pipelines submit 2D points and the
/// deviation score then ignores the depth axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Landmark {
    #[allow(dead_code)]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    #[allow(dead_code)]
    pub fn with_depth(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }
}

/// Reference posture an account has designated as correct.
///
/// History is append-only; the current baseline is the most recent row.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineLandmarkSet {
    pub id: Uuid,
    pub account_id: Uuid,
    pub landmarks: Vec<Landmark>,
    pub captured_at: DateTime<Utc>,
}

/// Outcome of comparing a live sample against the baseline.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeviationResult {
    pub score: f64,
    pub is_violation: bool,
    pub threshold: f64,
}

/// Recorded instance of a sample exceeding the deviation threshold.
/// Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub session_id: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub deviation_score: f64,
    pub landmarks: Vec<Landmark>,
}

impl ViolationEvent {
    pub fn new(
        account_id: Uuid,
        session_id: Option<String>,
        detected_at: DateTime<Utc>,
        deviation_score: f64,
        landmarks: Vec<Landmark>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            session_id,
            detected_at,
            deviation_score,
            landmarks,
        }
    }

    /// UTC calendar day this event aggregates under.
    pub fn period(&self) -> NaiveDate {
        self.detected_at.date_naive()
    }
}

/// Per-account, per-day violation statistics.
///
/// Raw sufficient statistics (count, sum, sum of squares) are stored instead
/// of a pre-divided mean so concurrent updates commute and the row stays
/// reproducible by replaying events for the period.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AggregateStats {
    pub account_id: Uuid,
    pub period: NaiveDate,
    pub violation_count: i64,
    pub score_sum: f64,
    pub score_sum_squares: f64,
}

impl AggregateStats {
    pub fn empty(account_id: Uuid, period: NaiveDate) -> Self {
        Self {
            account_id,
            period,
            violation_count: 0,
            score_sum: 0.0,
            score_sum_squares: 0.0,
        }
    }

    /// Fold one violation score into the statistics. Addition-only, so the
    /// order of application never affects the result.
    pub fn apply(&mut self, score: f64) {
        self.violation_count += 1;
        self.score_sum += score;
        self.score_sum_squares += score * score;
    }

    pub fn mean_score(&self) -> Option<f64> {
        if self.violation_count == 0 {
            None
        } else {
            Some(self.score_sum / self.violation_count as f64)
        }
    }

    pub fn score_variance(&self) -> Option<f64> {
        if self.violation_count == 0 {
            return None;
        }
        let n = self.violation_count as f64;
        let mean = self.score_sum / n;
        Some((self.score_sum_squares / n - mean * mean).max(0.0))
    }
}

// ---------------------------------------------------------------------------
// Request/response shapes
// ---------------------------------------------------------------------------

/// Request body shared by baseline capture and live-sample submission.
#[derive(Debug, Deserialize)]
pub struct LandmarkPayload {
    pub landmarks: Vec<Landmark>,
}

#[derive(Debug, Serialize)]
pub struct SampleResponse {
    pub is_violation: bool,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Number of days to report, counting back from today (UTC). Defaults to 7.
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DailyStats {
    pub period: NaiveDate,
    pub violation_count: i64,
    pub mean_score: Option<f64>,
    pub score_stddev: Option<f64>,
}

impl From<AggregateStats> for DailyStats {
    fn from(stats: AggregateStats) -> Self {
        Self {
            period: stats.period,
            mean_score: stats.mean_score(),
            score_stddev: stats.score_variance().map(f64::sqrt),
            violation_count: stats.violation_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub days: Vec<DailyStats>,
    pub total_violations: i64,
    pub overall_mean_score: Option<f64>,
}

impl StatsResponse {
    pub fn from_rows(rows: Vec<AggregateStats>) -> Self {
        let total_violations: i64 = rows.iter().map(|r| r.violation_count).sum();
        let score_sum: f64 = rows.iter().map(|r| r.score_sum).sum();
        let overall_mean_score = if total_violations > 0 {
            Some(score_sum / total_violations as f64)
        } else {
            None
        };
        Self {
            days: rows.into_iter().map(DailyStats::from).collect(),
            total_violations,
            overall_mean_score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RebuildRequest {
    pub period: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    /// New per-account threshold; `null` clears the override.
    pub threshold: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_apply_updates_sufficient_statistics() {
        let mut stats = AggregateStats::empty(Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        stats.apply(2.0);
        stats.apply(4.0);

        assert_eq!(stats.violation_count, 2);
        assert!((stats.score_sum - 6.0).abs() < f64::EPSILON);
        assert!((stats.score_sum_squares - 20.0).abs() < f64::EPSILON);
        assert!((stats.mean_score().unwrap() - 3.0).abs() < f64::EPSILON);
        assert!((stats.score_variance().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stats_apply_commutes() {
        let period = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let account_id = Uuid::new_v4();
        let scores = [1.5, 3.25, 2.0, 7.75, 0.5];

        let mut forward = AggregateStats::empty(account_id, period);
        for s in scores {
            forward.apply(s);
        }
        let mut backward = AggregateStats::empty(account_id, period);
        for s in scores.iter().rev() {
            backward.apply(*s);
        }

        assert_eq!(forward, backward);
    }

    #[test]
    fn empty_stats_have_no_mean() {
        let stats = AggregateStats::empty(Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(stats.mean_score(), None);
        assert_eq!(stats.score_variance(), None);
    }

    #[test]
    fn landmark_rejects_non_finite_coordinates() {
        assert!(Landmark::new(0.5, 0.5).is_finite());
        assert!(!Landmark::new(f64::NAN, 0.0).is_finite());
        assert!(!Landmark::with_depth(0.0, 0.0, f64::INFINITY).is_finite());
    }
}
