use axum::{extract::Extension, response::Json};
use std::sync::Arc;

use crate::{
    config::Config,
    database::Repository,
    errors::{AppError, Result},
    middleware::AuthAccount,
    models::{AccountResponse, ThresholdRequest},
};

/// Profile page data: the account plus its effective deviation threshold
/// and whether a baseline has been captured yet.
pub async fn me(
    Extension(repository): Extension<Arc<dyn Repository>>,
    Extension(config): Extension<Arc<Config>>,
    Extension(auth): Extension<AuthAccount>,
) -> Result<Json<serde_json::Value>> {
    let baseline = repository.get_baseline(auth.account.id).await?;
    let effective_threshold = auth
        .account
        .deviation_threshold
        .unwrap_or(config.deviation_threshold);

    Ok(Json(serde_json::json!({
        "account": AccountResponse::from(auth.account),
        "deviation_threshold": effective_threshold,
        "has_baseline": baseline.is_some(),
        "baseline_captured_at": baseline.map(|b| b.captured_at),
    })))
}

/// Set or clear the per-account deviation threshold override.
pub async fn set_threshold(
    Extension(repository): Extension<Arc<dyn Repository>>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<ThresholdRequest>,
) -> Result<Json<serde_json::Value>> {
    if let Some(threshold) = req.threshold {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(AppError::bad_request("Threshold must be a positive number"));
        }
    }

    repository
        .set_deviation_threshold(auth.account.id, req.threshold)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Threshold updated",
        "threshold": req.threshold,
    })))
}
