use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issued-credential record held in the credential store, keyed by the
/// token's `jti`. Kept minimal: enough to answer revocation and expiry,
/// plus request provenance for audit logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token_id: String,
    pub account_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub user_agent: Option<String>,
}

impl SessionRecord {
    pub fn new(
        token_id: String,
        account_id: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            token_id,
            account_id,
            issued_at,
            expires_at,
            revoked: false,
            user_agent,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
