use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::SessionRecord;

use super::CredentialStore;

/// Redis connection manager with automatic reconnect on failed operations.
#[derive(Clone)]
pub struct RedisManager {
    connection_manager: Arc<RwLock<ConnectionManager>>,
    client: Client,
}

impl RedisManager {
    pub async fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CredentialStoreError(format!("Redis client creation failed: {}", e))
        })?;

        let connection_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            error!("Failed to create Redis connection manager: {}", e);
            AppError::CredentialStoreError(format!("Redis connection failed: {}", e))
        })?;

        info!("Redis connection established successfully");

        Ok(Self {
            connection_manager: Arc::new(RwLock::new(connection_manager)),
            client,
        })
    }

    /// Health check for the Redis connection
    #[allow(dead_code)]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let mut conn = self.connection_manager.write().await;

        match redis::cmd("PING").query_async::<String>(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Redis health check failed: {}", e);
                Err(AppError::CredentialStoreError(format!("Redis health check failed: {}", e)))
            }
        }
    }

    async fn reconnect(&self) -> Result<(), AppError> {
        warn!("Attempting to reconnect to Redis...");

        let new_connection = ConnectionManager::new(self.client.clone()).await.map_err(|e| {
            error!("Failed to reconnect to Redis: {}", e);
            AppError::CredentialStoreError(format!("Redis reconnection failed: {}", e))
        })?;

        let mut conn = self.connection_manager.write().await;
        *conn = new_connection;

        info!("Redis reconnection successful");
        Ok(())
    }

    /// Execute a Redis command with one automatic retry after reconnecting.
    async fn execute_with_retry<F, T>(&self, operation: F) -> Result<T, AppError>
    where
        F: Fn(&mut ConnectionManager) -> std::pin::Pin<Box<dyn std::future::Future<Output = RedisResult<T>> + Send + '_>>
            + Send
            + Sync,
        T: Send,
    {
        let mut conn = self.connection_manager.write().await;

        match operation(&mut *conn).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("Redis operation failed, attempting reconnect: {}", e);
                drop(conn); // Release the lock before reconnecting

                self.reconnect().await?;

                let mut conn = self.connection_manager.write().await;
                operation(&mut *conn).await.map_err(|e| {
                    error!("Redis operation failed after reconnect: {}", e);
                    AppError::CredentialStoreError(format!("Redis operation failed: {}", e))
                })
            }
        }
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), AppError> {
        self.execute_with_retry(|conn| {
            let key = key.to_string();
            let value = value.to_string();
            Box::pin(async move {
                let _: () = conn.set_ex(&key, &value, ttl_seconds).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.execute_with_retry(|conn| {
            let key = key.to_string();
            Box::pin(async move {
                let value: Option<String> = conn.get(&key).await?;
                Ok(value)
            })
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn del(&self, key: &str) -> Result<(), AppError> {
        self.execute_with_retry(|conn| {
            let key = key.to_string();
            Box::pin(async move {
                let _: i64 = conn.del(&key).await?;
                Ok(())
            })
        })
        .await
    }

    /// Increment a rate-limit counter, setting the window TTL on first hit.
    pub async fn increment_rate_limit(&self, key: &str, window_seconds: u64) -> Result<i64, AppError> {
        self.execute_with_retry(|conn| {
            let key = key.to_string();
            Box::pin(async move {
                let count: i64 = conn.incr(&key, 1).await?;
                if count == 1 {
                    let _: bool = conn.expire(&key, window_seconds as i64).await?;
                }
                Ok(count)
            })
        })
        .await
    }
}

/// Credential store backed by Redis: one TTL'd JSON record per issued token,
/// keyed by `jti`. Records expire from Redis shortly after the token itself
/// expires, so revocation state never outlives its usefulness.
#[derive(Clone)]
pub struct RedisCredentialStore {
    redis: Arc<RedisManager>,
}

impl RedisCredentialStore {
    pub fn new(redis: Arc<RedisManager>) -> Self {
        Self { redis }
    }

    fn key(token_id: &str) -> String {
        format!("credential:{}", token_id)
    }

    /// Seconds until the record is useless: token expiry plus a minute of
    /// slack so expiry-vs-revocation checks near the boundary stay stable.
    fn remaining_ttl(record: &SessionRecord) -> u64 {
        let remaining = (record.expires_at - Utc::now()).num_seconds();
        remaining.max(0) as u64 + 60
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), AppError> {
        let data = serde_json::to_string(record)
            .map_err(|e| AppError::internal(format!("Session record serialization failed: {}", e)))?;

        self.redis
            .set_with_ttl(&Self::key(&record.token_id), &data, Self::remaining_ttl(record))
            .await
    }

    async fn get(&self, token_id: &str) -> Result<Option<SessionRecord>, AppError> {
        match self.redis.get(&Self::key(token_id)).await? {
            Some(data) => {
                let record: SessionRecord = serde_json::from_str(&data)
                    .map_err(|e| AppError::internal(format!("Session record deserialization failed: {}", e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn revoke(&self, token_id: &str) -> Result<(), AppError> {
        // Unknown token: nothing to mark, and verification already treats
        // missing records as revoked.
        let Some(mut record) = self.get(token_id).await? else {
            return Ok(());
        };

        if record.revoked {
            return Ok(());
        }

        record.revoked = true;
        self.put(&record).await
    }
}
