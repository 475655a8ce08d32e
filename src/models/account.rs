use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A local account, created on first federated login.
///
/// `external_id` is the identifier issued by the identity provider and is
/// immutable after creation; the store enforces its uniqueness.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub external_id: String,
    pub provider: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture: Option<String>,
    /// Per-account deviation threshold override; `None` falls back to the
    /// configured global default.
    pub deviation_threshold: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Validated profile produced by the federated login exchange.
///
/// Required claims are checked at the provider boundary, so everything
/// inward of the exchange works with typed, present fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProfile {
    pub external_id: String,
    pub provider: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub code: String,
    pub redirect_uri: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountResponse,
}

/// Account shape returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub picture: Option<String>,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            display_name: account.display_name,
            picture: account.picture,
            provider: account.provider,
            created_at: account.created_at,
        }
    }
}
