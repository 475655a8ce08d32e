use axum::{
    extract::{Extension, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::database::RedisManager;
use crate::errors::AppError;

/// Rate limiting for the login endpoint, counted per client IP over a
/// fixed window in Redis.
pub async fn rate_limit_middleware(
    Extension(config): Extension<Arc<Config>>,
    Extension(redis_manager): Extension<Arc<RedisManager>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = extract_ip_from_headers(request.headers());
    let key = format!("rate:login:{}", ip);

    let count = redis_manager
        .increment_rate_limit(&key, config.rate_limit_window_seconds)
        .await?;

    if count > i64::from(config.rate_limit_requests) {
        tracing::warn!(ip = %ip, count, "Login rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}

/// Extract the client IP with the usual proxy-header fallback chain.
pub fn extract_ip_from_headers(headers: &HeaderMap) -> IpAddr {
    // Try X-Forwarded-For first (for proxies)
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded_for.to_str() {
            // Take the first IP in the chain
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    // Try X-Real-IP
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                return ip;
            }
        }
    }

    // Fallback to localhost
    IpAddr::from([127, 0, 0, 1])
}
