//! Redis cache backend.
//!
//! Layout:
//! - `{prefix}{id}`: JSON snapshot with `PX` expiry
//! - `{recent_list_key}`: sorted set of JSON snapshots scored by `created_at`
//! - `{recent_list_key}:{operation}:lock`: `SET NX PX` lock holding a token

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use std::time::Duration;

use super::{CacheError, CacheKeys, CacheStore, RECENT_LIST_LIMIT};
use crate::model::Notification;

/// Deletes the lock only while it still holds the caller's token.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed [`CacheStore`].
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    keys: CacheKeys,
    release_script: Script,
}

impl RedisCache {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn connect(url: &str, keys: CacheKeys) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let pong: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!(url, reply = %pong, "Connected to Redis cache");

        Ok(Self {
            conn,
            keys,
            release_script: Script::new(RELEASE_LOCK_SCRIPT),
        })
    }
}

/// Longest expiry sent to Redis, which rejects `PX` values past its clock range.
const MAX_TTL_MILLIS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_TTL_MILLIS)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get_entity(&self, id: i64) -> Result<Option<Notification>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.keys.entity_key(id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_entity(&self, notification: &Notification, ttl: Duration) -> Result<(), CacheError> {
        let raw = serde_json::to_string(notification)?;
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(self.keys.entity_key(notification.id))
            .arg(raw)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_entity(&self, id: i64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(self.keys.entity_key(id)).await?;
        Ok(())
    }

    async fn get_recent_list(&self) -> Result<Vec<Notification>, CacheError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrevrange(&self.keys.recent_list_key, 0, -1).await?;
        members
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(CacheError::from))
            .collect()
    }

    async fn populate_recent_list(&self, notifications: &[Notification]) -> Result<(), CacheError> {
        if notifications.is_empty() {
            return Ok(());
        }

        let key = &self.keys.recent_list_key;
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for notification in notifications {
            let member = serde_json::to_string(notification)?;
            pipe.zadd(key, member, notification.created_at).ignore();
        }
        // Keep only the highest-scored members.
        let keep = RECENT_LIST_LIMIT as isize;
        pipe.zremrangebyrank(key, 0, -(keep + 1)).ignore();

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn clear_recent_list(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(&self.keys.recent_list_key).await?;
        Ok(())
    }

    async fn try_acquire_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    fn lock_key_for(&self, operation: &str) -> String {
        self.keys.lock_key(operation)
    }
}
