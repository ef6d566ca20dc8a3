/// Redis backend for the settings store, selected when `REDIS_URL` is set.
///
/// Only plain string keys are used (today just the Gemini API key), stored without a TTL so
/// the key outlives server restarts. A down server never fails a tool call: lookups come
/// back empty and writes report `false`, which the store above turns into a warning.
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::warn;

use crate::error::CommonError;

#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Only the URL is checked; the first connection happens on first use.
    pub fn new(url: &str) -> Result<Self, CommonError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }

    /// PING check behind the "redis connected" log line.
    pub async fn is_available(&self) -> bool {
        let Some(mut conn) = self.connect().await else {
            return false;
        };
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    /// Stored value for `key`. An unreachable server reads the same as an unset key.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connect().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis read failed"))
            .ok()
            .flatten()
    }

    pub async fn set(&self, key: &str, value: &str) -> bool {
        match self.connect().await {
            Some(mut conn) => conn
                .set::<_, _, ()>(key, value)
                .await
                .inspect_err(|e| warn!(error = %e, key, "redis write failed"))
                .is_ok(),
            None => false,
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.connect().await {
            Some(mut conn) => conn
                .del::<_, ()>(key)
                .await
                .inspect_err(|e| warn!(error = %e, key, "redis delete failed"))
                .is_ok(),
            None => false,
        }
    }

    async fn connect(&self) -> Option<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis unreachable"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::RedisCache;

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisCache::new("not a redis url").is_err());
    }

    #[tokio::test]
    async fn unreachable_server_reads_empty_and_refuses_writes() {
        // Nothing listens on port 1.
        let cache = RedisCache::new("redis://127.0.0.1:1/").expect("url parses");
        assert!(!cache.is_available().await);
        assert_eq!(cache.get("geminiApiKey").await, None);
        assert!(!cache.set("geminiApiKey", "x").await);
        assert!(!cache.delete("geminiApiKey").await);
    }
}
