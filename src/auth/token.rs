use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;

/// Claims carried by an access token. A fixed structured set: no executable
/// content, nothing beyond identity and validity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token identifier
    pub jti: String,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// Signs and verifies bearer tokens with a single symmetric key configured
/// at startup. Decoding is pinned to HS256: a token whose header names any
/// other algorithm is rejected outright.
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenManager {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let key_bytes = Self::key_bytes(&config.token_secret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(&key_bytes),
            decoding_key: DecodingKey::from_secret(&key_bytes),
            validation,
            ttl: Duration::seconds(config.token_ttl_seconds as i64),
        })
    }

    /// Accept the secret as exactly 32 raw bytes, or as base64 decoding to
    /// at least 32 bytes.
    fn key_bytes(secret: &str) -> Result<Vec<u8>, AppError> {
        if secret.len() == 32 {
            return Ok(secret.as_bytes().to_vec());
        }

        use base64::{engine::general_purpose, Engine as _};
        let decoded = general_purpose::STANDARD
            .decode(secret)
            .map_err(|_| AppError::ConfigurationError("TOKEN_SECRET is neither 32 bytes nor valid base64".to_string()))?;

        if decoded.len() < 32 {
            return Err(AppError::ConfigurationError(
                "TOKEN_SECRET must decode to at least 32 bytes".to_string(),
            ));
        }

        Ok(decoded)
    }

    /// Issue a token for the account with `exp = now + configured TTL`.
    pub fn sign(&self, account_id: &Uuid) -> Result<(String, Claims), AppError> {
        let now = Utc::now();
        self.sign_with_expiry(account_id, now, now + self.ttl)
    }

    fn sign_with_expiry(
        &self,
        account_id: &Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(String, Claims), AppError> {
        let claims = Claims {
            sub: account_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalServerError(format!("Failed to sign token: {}", e)))?;

        Ok((token, claims))
    }

    /// Decode and verify a token, distinguishing an expired token from a
    /// malformed or forged one.
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AppError::TokenExpired),
                _ => Err(AppError::InvalidToken(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(secret: &str, ttl: u64) -> Config {
        Config {
            database_url: "postgres://localhost/test".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            token_secret: secret.to_string(),
            token_ttl_seconds: ttl,
            deviation_threshold: 1.0,
            oauth_client_id: "client".to_string(),
            oauth_client_secret: "secret".to_string(),
            oauth_token_url: "http://localhost/token".to_string(),
            oauth_userinfo_url: "http://localhost/userinfo".to_string(),
            oauth_timeout_seconds: 5,
            rate_limit_requests: 30,
            rate_limit_window_seconds: 60,
        }
    }

    fn manager() -> TokenManager {
        TokenManager::new(&test_config("0123456789abcdef0123456789abcdef", 3600)).unwrap()
    }

    #[test]
    fn sign_then_decode_roundtrip() {
        let manager = manager();
        let account_id = Uuid::new_v4();

        let (token, claims) = manager.sign(&account_id).unwrap();
        let decoded = manager.decode(&token).unwrap();

        assert_eq!(decoded.sub, account_id.to_string());
        assert_eq!(decoded.jti, claims.jti);
        assert_eq!(decoded.exp, claims.exp);
        assert!(decoded.exp > Utc::now().timestamp());
    }

    #[test]
    fn each_token_gets_a_unique_jti() {
        let manager = manager();
        let account_id = Uuid::new_v4();

        let (_, a) = manager.sign(&account_id).unwrap();
        let (_, b) = manager.sign(&account_id).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn tampered_token_is_invalid() {
        let manager = manager();
        let (token, _) = manager.sign(&Uuid::new_v4()).unwrap();

        // Flip one payload byte; the signature no longer matches.
        let mut bytes = token.into_bytes();
        let payload_start = bytes.iter().position(|&b| b == b'.').unwrap() + 1;
        bytes[payload_start] = if bytes[payload_start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        match manager.decode(&tampered) {
            Err(AppError::InvalidToken(_)) => {}
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[test]
    fn expired_token_is_reported_as_expired_not_invalid() {
        let manager = manager();
        let now = Utc::now();
        let (token, _) = manager
            .sign_with_expiry(&Uuid::new_v4(), now - Duration::hours(2), now - Duration::hours(1))
            .unwrap();

        match manager.decode(&token) {
            Err(AppError::TokenExpired) => {}
            other => panic!("expected TokenExpired, got {:?}", other),
        }
    }

    #[test]
    fn token_signed_with_different_key_is_rejected() {
        let manager_a = manager();
        let manager_b =
            TokenManager::new(&test_config("ffffffffffffffffffffffffffffffff", 3600)).unwrap();

        let (token, _) = manager_b.sign(&Uuid::new_v4()).unwrap();
        assert!(matches!(manager_a.decode(&token), Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn unsigned_token_with_none_algorithm_is_rejected() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

        let manager = manager();
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            format!(r#"{{"sub":"{}","iat":0,"exp":{},"jti":"x"}}"#, Uuid::new_v4(), exp).as_bytes(),
        );
        let forged = format!("{}.{}.", header, payload);

        assert!(matches!(manager.decode(&forged), Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn short_secret_must_be_base64_of_32_bytes() {
        assert!(matches!(
            TokenManager::new(&test_config("too-short", 3600)),
            Err(AppError::ConfigurationError(_))
        ));

        // 32 zero bytes, base64-encoded
        use base64::{engine::general_purpose, Engine as _};
        let encoded = general_purpose::STANDARD.encode([0u8; 32]);
        assert!(TokenManager::new(&test_config(&encoded, 3600)).is_ok());
    }
}
