//! Short-TTL cache for derived personalization vectors.
//!
//! The cache is best-effort: entries expire within seconds, a miss is normal
//! and triggers recomputation upstream, and a failed write never fails the
//! job that produced the value.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis_utils::SharedConnectionManager;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::models::UserVectors;

const USER_VECTORS_PREFIX: &str = "user_vectors";

/// Cache key for a user's for-you vector pair.
pub fn user_vectors_key(user_id: Uuid, recent: bool) -> String {
    if recent {
        format!("recent:{USER_VECTORS_PREFIX}:{user_id}")
    } else {
        format!("{USER_VECTORS_PREFIX}:{user_id}")
    }
}

/// TTL'd string cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorCache: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

pub struct RedisVectorCache {
    manager: SharedConnectionManager,
}

impl RedisVectorCache {
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VectorCache for RedisVectorCache {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.manager.lock().await;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.lock().await;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}

/// Read side of the contract: fetch and deserialize the cached pair.
/// A corrupt entry logs and reads as a miss rather than an error.
pub async fn cached_user_vectors(
    cache: &dyn VectorCache,
    user_id: Uuid,
    recent: bool,
) -> Result<Option<UserVectors>> {
    let key = user_vectors_key(user_id, recent);
    let Some(raw) = cache.get(&key).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(vectors) => Ok(Some(vectors)),
        Err(e) => {
            warn!(key = %key, error = %e, "discarding unparseable cached vectors");
            Ok(None)
        }
    }
}
