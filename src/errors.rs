use std::fmt;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Identity-provider errors
    ProviderRejected(String),
    ProviderUnavailable(String),

    // Token and session errors
    InvalidToken(String),
    TokenExpired,
    TokenRevoked,
    Unauthorized,

    // Posture validation errors
    ShapeMismatch { expected: usize, actual: usize },
    MissingBaseline,

    // Account errors
    DuplicateAccount(String),
    AccountNotFound(String),

    // Persistence errors
    DatabaseError(String),
    CredentialStoreError(String),

    // General errors
    ConfigurationError(String),
    BadRequest(String),
    NotFound(String),
    RateLimited,
    InternalServerError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::ProviderRejected(msg) => write!(f, "Identity provider rejected the request: {}", msg),
            AppError::ProviderUnavailable(msg) => write!(f, "Identity provider unavailable: {}", msg),

            AppError::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            AppError::TokenExpired => write!(f, "Token has expired"),
            AppError::TokenRevoked => write!(f, "Token has been revoked"),
            AppError::Unauthorized => write!(f, "Unauthorized access"),

            AppError::ShapeMismatch { expected, actual } => {
                write!(f, "Landmark shape mismatch: baseline has {} landmarks, sample has {}", expected, actual)
            }
            AppError::MissingBaseline => write!(f, "No baseline captured for this account"),

            AppError::DuplicateAccount(external_id) => write!(f, "Account already exists for external identity: {}", external_id),
            AppError::AccountNotFound(id) => write!(f, "Account not found: {}", id),

            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::CredentialStoreError(msg) => write!(f, "Credential store error: {}", msg),

            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(resource) => write!(f, "Resource not found: {}", resource),
            AppError::RateLimited => write!(f, "Too many requests"),
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Stable machine-readable kind for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ProviderRejected(_) => "provider_rejected",
            AppError::ProviderUnavailable(_) => "provider_unavailable",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::TokenExpired => "token_expired",
            AppError::TokenRevoked => "token_revoked",
            AppError::Unauthorized => "unauthorized",
            AppError::ShapeMismatch { .. } => "shape_mismatch",
            AppError::MissingBaseline => "missing_baseline",
            AppError::DuplicateAccount(_) => "duplicate_account",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::DatabaseError(_) => "storage_unavailable",
            AppError::CredentialStoreError(_) => "storage_unavailable",
            AppError::ConfigurationError(_) => "configuration_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::RateLimited => "rate_limited",
            AppError::InternalServerError(_) => "internal_error",
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalServerError(msg.into())
    }
}

// Secure HTTP response implementation
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, user_message) = match &self {
            AppError::ProviderRejected(_) => (
                StatusCode::UNAUTHORIZED,
                "Identity provider rejected the authorization code".to_string(),
            ),
            AppError::ProviderUnavailable(msg) => {
                tracing::warn!("Identity provider unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Identity provider is unavailable, retry later".to_string(),
                )
            }

            AppError::InvalidToken(_) => (
                StatusCode::UNAUTHORIZED,
                "Invalid token".to_string(),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "Token has expired".to_string(),
            ),
            AppError::TokenRevoked => (
                StatusCode::UNAUTHORIZED,
                "Token has been revoked".to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),

            AppError::ShapeMismatch { expected, actual } => (
                StatusCode::BAD_REQUEST,
                format!("Landmark count mismatch: baseline has {}, sample has {}", expected, actual),
            ),
            AppError::MissingBaseline => (
                StatusCode::NOT_FOUND,
                "No baseline captured yet".to_string(),
            ),

            // Recovered internally during login; surfacing it means a bug upstream
            AppError::DuplicateAccount(external_id) => {
                tracing::error!("Unrecovered duplicate account conflict: {}", external_id);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::AccountNotFound(_) => (
                StatusCode::NOT_FOUND,
                "Account not found".to_string(),
            ),

            // Persistence errors: never leak storage details
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::CredentialStoreError(msg) => {
                tracing::error!("Credential store error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }

            AppError::ConfigurationError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                format!("{} not found", resource),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, slow down".to_string(),
            ),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let kind = self.kind();

        // Log all errors for monitoring (with sanitized info)
        tracing::warn!(
            status = %status,
            kind = %kind,
            "API error occurred"
        );

        let body = Json(json!({
            "error": {
                "message": user_message,
                "kind": kind,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

// Conversion from database errors
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::CredentialStoreError(err.to_string())
    }
}
