use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::{
    database::Repository,
    errors::{AppError, Result},
    middleware::AuthAccount,
    models::{
        pose::DailyStats, AggregateStats, BaselineLandmarkSet, LandmarkPayload, Landmark,
        RebuildRequest, SampleResponse, StatsQuery, StatsResponse,
    },
    pose::{DeviationDetector, EventRecorder},
};

const MAX_STATS_DAYS: u32 = 90;

/// Capture a new baseline for the authenticated account. The previous
/// baseline is retained as history; this one becomes current.
pub async fn capture_baseline(
    Extension(repository): Extension<Arc<dyn Repository>>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<LandmarkPayload>,
) -> Result<(StatusCode, Json<BaselineLandmarkSet>)> {
    validate_landmarks(&req.landmarks)?;

    let baseline = repository
        .put_baseline(auth.account.id, &req.landmarks, Utc::now())
        .await?;

    tracing::info!(
        account_id = %auth.account.id,
        landmarks = baseline.landmarks.len(),
        "Captured new posture baseline"
    );

    Ok((StatusCode::CREATED, Json(baseline)))
}

/// Evaluate one live sample against the current baseline.
///
/// A violating sample is recorded as exactly one event before the response
/// is returned; a conforming sample records nothing.
pub async fn submit_sample(
    Extension(repository): Extension<Arc<dyn Repository>>,
    Extension(detector): Extension<Arc<DeviationDetector>>,
    Extension(recorder): Extension<Arc<EventRecorder>>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<LandmarkPayload>,
) -> Result<Json<SampleResponse>> {
    validate_landmarks(&req.landmarks)?;

    let baseline = repository
        .get_baseline(auth.account.id)
        .await?
        .ok_or(AppError::MissingBaseline)?;

    let result = detector.evaluate(
        &baseline.landmarks,
        &req.landmarks,
        auth.account.deviation_threshold,
    )?;

    if result.is_violation {
        recorder
            .record(
                auth.account.id,
                Some(auth.claims.jti.clone()),
                &result,
                &req.landmarks,
                Utc::now(),
            )
            .await?;
    }

    Ok(Json(SampleResponse {
        is_violation: result.is_violation,
        score: result.score,
    }))
}

/// Per-day violation statistics for the authenticated account, counting
/// back from today (UTC).
pub async fn stats(
    Extension(repository): Extension<Arc<dyn Repository>>,
    Extension(auth): Extension<AuthAccount>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>> {
    let days = query.days.unwrap_or(7).clamp(1, MAX_STATS_DAYS);

    let today = Utc::now().date_naive();
    let from = today - Duration::days(i64::from(days) - 1);

    let rows = repository.stats_range(auth.account.id, from, today).await?;

    Ok(Json(StatsResponse::from_rows(rows)))
}

/// Recompute one period's statistics by replaying its recorded events.
pub async fn rebuild_stats(
    Extension(recorder): Extension<Arc<EventRecorder>>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<RebuildRequest>,
) -> Result<Json<DailyStats>> {
    let stats: AggregateStats = recorder.rebuild_stats(auth.account.id, req.period).await?;
    Ok(Json(DailyStats::from(stats)))
}

fn validate_landmarks(landmarks: &[Landmark]) -> Result<()> {
    if landmarks.is_empty() {
        return Err(AppError::bad_request("Landmark list must not be empty"));
    }
    if landmarks.iter().any(|l| !l.is_finite()) {
        return Err(AppError::bad_request("Landmark coordinates must be finite numbers"));
    }
    Ok(())
}
