use axum::{
    extract::{Extension, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{Claims, SessionManager};
use crate::errors::AppError;
use crate::models::Account;

/// Authenticated identity injected into protected route handlers.
#[derive(Debug, Clone)]
pub struct AuthAccount {
    pub account: Account,
    pub claims: Claims,
}

/// Authentication middleware: every protected request presents a bearer
/// token, which is verified against signature, expiry and revocation before
/// the handler runs.
pub async fn auth_middleware(
    Extension(session_manager): Extension<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    let (account, claims) = session_manager.verify(&token).await?;

    request.extensions_mut().insert(AuthAccount { account, claims });

    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
