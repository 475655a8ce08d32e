use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::ExternalProfile;

const PROVIDER_NAME: &str = "google";

/// Completes the authorization-code exchange against the identity provider
/// and normalizes the returned profile.
///
/// Stateless: one token call plus one userinfo call per login attempt, no
/// retries, no side effects. Failures are classified so the caller can tell
/// a rejected code from a provider outage.
pub struct OAuthExchange {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    userinfo_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    /// Google's userinfo v2 exposes `id`; OIDC-shaped endpoints expose `sub`.
    id: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl OAuthExchange {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.oauth_timeout_seconds))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            client_id: config.oauth_client_id.clone(),
            client_secret: config.oauth_client_secret.clone(),
            token_url: config.oauth_token_url.clone(),
            userinfo_url: config.oauth_userinfo_url.clone(),
        })
    }

    /// Exchange an authorization code for a validated external profile.
    pub async fn exchange(
        &self,
        authorization_code: &str,
        redirect_uri: &str,
    ) -> Result<ExternalProfile, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", authorization_code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        check_provider_status("token endpoint", response.status())?;

        let token: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderRejected(format!("Malformed token response: {}", e)))?;

        let access_token = token
            .access_token
            .ok_or_else(|| AppError::ProviderRejected("Token response carried no access token".to_string()))?;

        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(transport_error)?;

        check_provider_status("userinfo endpoint", response.status())?;

        let info: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderRejected(format!("Malformed userinfo response: {}", e)))?;

        profile_from_userinfo(info)
    }
}

/// Network-level failures (refused connection, timeout) mean the provider is
/// unreachable, not that the code was bad.
fn transport_error(e: reqwest::Error) -> AppError {
    AppError::ProviderUnavailable(e.to_string())
}

/// 4xx means the provider examined and rejected the request; 5xx means the
/// provider itself is failing and the whole login attempt may be retried.
fn check_provider_status(endpoint: &str, status: StatusCode) -> Result<(), AppError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() {
        Err(AppError::ProviderUnavailable(format!("{} returned {}", endpoint, status)))
    } else {
        Err(AppError::ProviderRejected(format!("{} returned {}", endpoint, status)))
    }
}

/// Reject unexpected or missing required claims here, at the provider
/// boundary, so everything inward works with a typed profile.
fn profile_from_userinfo(info: UserInfoResponse) -> Result<ExternalProfile, AppError> {
    let external_id = info
        .id
        .or(info.sub)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::ProviderRejected("Userinfo carried no subject identifier".to_string()))?;

    let email = info
        .email
        .filter(|email| !email.is_empty())
        .ok_or_else(|| AppError::ProviderRejected("Userinfo carried no email claim".to_string()))?;

    Ok(ExternalProfile {
        external_id,
        provider: PROVIDER_NAME.to_string(),
        email,
        display_name: info.name.filter(|n| !n.is_empty()),
        picture: info.picture.filter(|p| !p.is_empty()),
    })
}
