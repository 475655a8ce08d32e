use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::token::{Claims, TokenManager};
use crate::database::{CredentialStore, Repository};
use crate::errors::AppError;
use crate::models::{Account, ExternalProfile, SessionRecord};

/// Orchestrates the credential lifecycle: federated login → account
/// resolution → token issuance, and request-time verification against the
/// credential store.
pub struct SessionManager {
    repository: Arc<dyn Repository>,
    credentials: Arc<dyn CredentialStore>,
    tokens: TokenManager,
}

impl SessionManager {
    pub fn new(
        repository: Arc<dyn Repository>,
        credentials: Arc<dyn CredentialStore>,
        tokens: TokenManager,
    ) -> Self {
        Self {
            repository,
            credentials,
            tokens,
        }
    }

    /// Resolve (or create) the account for a validated external profile and
    /// issue an access token for it.
    ///
    /// First login wins: account creation is serialized by the store's
    /// uniqueness constraint, and the loser of a concurrent first login
    /// re-reads the winner's row instead of failing the user.
    pub async fn login(
        &self,
        profile: ExternalProfile,
        user_agent: Option<String>,
    ) -> Result<(String, Claims, Account), AppError> {
        let account = match self
            .repository
            .find_account_by_external_id(&profile.external_id)
            .await?
        {
            Some(account) => account,
            None => match self.repository.create_account(&profile).await {
                Ok(account) => {
                    tracing::info!(account_id = %account.id, "Created account on first federated login");
                    account
                }
                Err(AppError::DuplicateAccount(_)) => self
                    .repository
                    .find_account_by_external_id(&profile.external_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::database(format!(
                            "Account for external identity {} vanished after creation conflict",
                            profile.external_id
                        ))
                    })?,
                Err(e) => return Err(e),
            },
        };

        let (token, claims) = self.tokens.sign(&account.id)?;

        let record = SessionRecord::new(
            claims.jti.clone(),
            account.id,
            Utc::now(),
            claims.expires_at(),
            user_agent,
        );
        self.credentials.put(&record).await?;

        Ok((token, claims, account))
    }

    /// Verify a bearer token and resolve its account.
    ///
    /// Rejections are distinguishable: a forged or malformed token fails
    /// differently from an expired or a revoked one. Read-only; always
    /// consults the credential store so revocation is immediately visible.
    pub async fn verify(&self, token: &str) -> Result<(Account, Claims), AppError> {
        let claims = self.tokens.decode(token)?;

        let record = self
            .credentials
            .get(&claims.jti)
            .await?
            .ok_or(AppError::TokenRevoked)?;

        if record.revoked {
            return Err(AppError::TokenRevoked);
        }
        if record.is_expired(Utc::now()) {
            return Err(AppError::TokenExpired);
        }

        let account_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::InvalidToken("Malformed subject claim".to_string()))?;
        if record.account_id != account_id {
            return Err(AppError::InvalidToken("Subject does not match issued credential".to_string()));
        }

        let account = self
            .repository
            .find_account_by_id(account_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok((account, claims))
    }

    /// Revoke a credential by token ID. Idempotent; takes effect for every
    /// verification issued after this returns.
    pub async fn revoke(&self, token_id: &str) -> Result<(), AppError> {
        self.credentials.revoke(token_id).await
    }

    /// Revoke the credential presented by its bearer.
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        let claims = self.tokens.decode(token)?;
        self.revoke(&claims.jti).await
    }
}
