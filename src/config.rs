use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// HS256 signing secret: raw bytes (>= 32) or base64-encoded.
    pub token_secret: String,
    /// Access token lifetime in seconds.
    pub token_ttl_seconds: u64,
    /// Global deviation threshold; accounts may override it.
    pub deviation_threshold: f64,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub oauth_token_url: String,
    pub oauth_userinfo_url: String,
    /// Upper bound on any single identity-provider call.
    pub oauth_timeout_seconds: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            host: env::var("HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid number"),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string()),
            token_secret: env::var("TOKEN_SECRET")
                .expect("TOKEN_SECRET must be set"),
            token_ttl_seconds: env::var("TOKEN_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .expect("TOKEN_TTL_SECONDS must be a valid number"),
            deviation_threshold: env::var("DEVIATION_THRESHOLD")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()
                .expect("DEVIATION_THRESHOLD must be a valid number"),
            oauth_client_id: env::var("OAUTH_CLIENT_ID")
                .expect("OAUTH_CLIENT_ID must be set"),
            oauth_client_secret: env::var("OAUTH_CLIENT_SECRET")
                .expect("OAUTH_CLIENT_SECRET must be set"),
            oauth_token_url: env::var("OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            oauth_userinfo_url: env::var("OAUTH_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v2/userinfo".to_string()),
            oauth_timeout_seconds: env::var("OAUTH_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("OAUTH_TIMEOUT_SECONDS must be a valid number"),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("RATE_LIMIT_REQUESTS must be a valid number"),
            rate_limit_window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("RATE_LIMIT_WINDOW_SECONDS must be a valid number"),
        }
    }

    // Smart RUST_LOG construction for Axum and tracing
    pub fn rust_log(&self) -> String {
        match self.log_level.to_lowercase().as_str() {
            "trace" => "trace,axum=trace,tower=trace,hyper=trace,postureguard=trace".to_string(),
            "debug" => "debug,axum=debug,tower=debug,hyper=debug,postureguard=debug".to_string(),
            "info" => "info,axum=info,tower=info,hyper=info,postureguard=info".to_string(),
            "warn" => "warn,axum=warn,tower=warn,hyper=warn,postureguard=warn".to_string(),
            "error" => "error,axum=error,tower=error,hyper=error,postureguard=error".to_string(),
            _ => "info,axum=info,tower=info,hyper=info,postureguard=info".to_string(), // fallback
        }
    }
}
