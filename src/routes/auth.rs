use axum::{
    extract::Extension,
    http::HeaderMap,
    response::Json,
};
use std::sync::Arc;

use crate::{
    auth::{OAuthExchange, SessionManager},
    errors::Result,
    middleware::AuthAccount,
    models::{AccountResponse, LoginRequest, LoginResponse},
};

/// Complete a federated login: exchange the authorization code with the
/// identity provider, resolve or create the local account, and issue an
/// access token.
///
/// A provider failure surfaces before any local state is touched, so a
/// failed login creates no account and issues no token.
pub async fn login(
    Extension(oauth): Extension<Arc<OAuthExchange>>,
    Extension(session_manager): Extension<Arc<SessionManager>>,
    headers: HeaderMap,
    Json(login_req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let profile = oauth.exchange(&login_req.code, &login_req.redirect_uri).await?;

    let user_agent = extract_user_agent(&headers);
    let (access_token, claims, account) = session_manager.login(profile, user_agent).await?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_at: claims.expires_at(),
        account: AccountResponse::from(account),
    }))
}

/// Current authenticated account.
pub async fn me(Extension(auth): Extension<AuthAccount>) -> Json<AccountResponse> {
    Json(AccountResponse::from(auth.account))
}

/// Revoke the presented credential. Subsequent requests with the same token
/// fail verification even before its expiry.
pub async fn logout(
    Extension(session_manager): Extension<Arc<SessionManager>>,
    Extension(auth): Extension<AuthAccount>,
) -> Result<Json<serde_json::Value>> {
    session_manager.revoke(&auth.claims.jti).await?;

    Ok(Json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

/// Extract user agent from request headers
fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|ua| ua.to_str().ok())
        .map(|ua| ua.to_string())
}
