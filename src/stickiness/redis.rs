//! Redis-backed stickiness store, shared by every balancer instance pointed
//! at the same Redis (6.2 or newer).
//!
//! # Keys
//! ```text
//! {prefix}:session:{session_key}  → server id                     (PX ttl)
//! {prefix}:server:{server_id}     → zset of session keys by expiry (PEXPIREAT newest expiry)
//! ```
//! The per-server index lets removal invalidate bindings without a keyspace
//! scan. Every bind drops index members whose expiry has passed, rebinding
//! or deleting a session removes it from its old server's index, and an index
//! key expires together with the newest binding it holds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::load_balancer::ServerId;
use crate::stickiness::{StickinessStore, StoreError};

const DEFAULT_PREFIX: &str = "balancer";

/// KEYS[1] index, ARGV[1] expiry ms, ARGV[2] session key, ARGV[3] now ms.
const INDEX_SCRIPT: &str = r#"
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[3])
local newest = redis.call('ZRANGE', KEYS[1], -1, -1, 'WITHSCORES')
if newest[2] then
  redis.call('PEXPIREAT', KEYS[1], newest[2])
end
return 1
"#;

/// KEYS[1] binding, KEYS[2] index, ARGV[1] server id, ARGV[2] session key.
const DELETE_IF_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('ZREM', KEYS[2], ARGV[2])
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisStickinessStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisStickinessStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        tracing::info!(url = %url, "Connected to Redis stickiness store");
        Ok(Self {
            conn,
            prefix: DEFAULT_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn session_key(&self, session_key: &str) -> String {
        format!("{}:session:{}", self.prefix, session_key)
    }

    fn server_key(&self, server_id: &str) -> String {
        format!("{}:server:{}", self.prefix, server_id)
    }

    async fn index(
        &self,
        session_key: &str,
        server_id: &ServerId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let now = unix_millis();
        let _: i64 = redis::cmd("EVAL")
            .arg(INDEX_SCRIPT)
            .arg(1)
            .arg(self.server_key(server_id.as_str()))
            .arg(now.saturating_add(ttl_millis(ttl)))
            .arg(session_key)
            .arg(now)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn unindex(&self, session_key: &str, server_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: usize = conn
            .zrem(self.server_key(server_id), session_key)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis().min(u64::MAX as u128) as u64).max(1)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or_default()
}

#[async_trait]
impl StickinessStore for RedisStickinessStore {
    async fn get(&self, session_key: &str) -> Result<Option<ServerId>, StoreError> {
        let mut conn = self.conn.clone();
        let bound: Option<String> = conn
            .get(self.session_key(session_key))
            .await
            .map_err(backend)?;
        Ok(bound.map(ServerId::new))
    }

    async fn set(
        &self,
        session_key: &str,
        server_id: &ServerId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let previous: Option<String> = redis::cmd("SET")
            .arg(self.session_key(session_key))
            .arg(server_id.as_str())
            .arg("PX")
            .arg(ttl_millis(ttl))
            .arg("GET")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        if let Some(previous) = previous.filter(|p| p != server_id.as_str()) {
            self.unindex(session_key, &previous).await?;
        }
        self.index(session_key, server_id, ttl).await
    }

    async fn set_if_absent(
        &self,
        session_key: &str,
        server_id: &ServerId,
        ttl: Duration,
    ) -> Result<ServerId, StoreError> {
        let key = self.session_key(session_key);
        let mut conn = self.conn.clone();

        // SET NX can lose to a binding that expires before the follow-up GET.
        for _ in 0..3 {
            let created: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(server_id.as_str())
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            if created.is_some() {
                self.index(session_key, server_id, ttl).await?;
                return Ok(server_id.clone());
            }

            let existing: Option<String> = conn.get(&key).await.map_err(backend)?;
            if let Some(existing) = existing {
                return Ok(ServerId::new(existing));
            }
        }

        Err(StoreError::Backend(format!(
            "binding for {} kept expiring during set_if_absent",
            session_key
        )))
    }

    async fn delete(&self, session_key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: Option<String> = redis::cmd("GETDEL")
            .arg(self.session_key(session_key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        match removed {
            Some(server_id) => {
                self.unindex(session_key, &server_id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_if(&self, session_key: &str, server_id: &ServerId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("EVAL")
            .arg(DELETE_IF_SCRIPT)
            .arg(2)
            .arg(self.session_key(session_key))
            .arg(self.server_key(server_id.as_str()))
            .arg(server_id.as_str())
            .arg(session_key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn delete_server(&self, server_id: &ServerId) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let index_key = self.server_key(server_id.as_str());
        let sessions: Vec<String> = conn.zrange(&index_key, 0, -1).await.map_err(backend)?;

        let mut removed = 0;
        for session in sessions {
            let key = self.session_key(&session);
            let bound: Option<String> = conn.get(&key).await.map_err(backend)?;
            // The session may since have been rebound elsewhere.
            if bound.as_deref() == Some(server_id.as_str()) {
                let n: usize = conn.del(&key).await.map_err(backend)?;
                removed += n;
            }
        }

        let _: () = conn.del(&index_key).await.map_err(backend)?;
        Ok(removed)
    }
}
