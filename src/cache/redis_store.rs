//! Redis-backed distributed store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::cache::distributed::DistributedStore;
use crate::error::Result;

/// Keys requested per SCAN round trip during prefix deletes
const SCAN_BATCH: usize = 500;

/// [`DistributedStore`] over a multiplexed, auto-reconnecting Redis
/// connection. TTLs are stored by Redis itself (`SET ... PX`).
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    /// Opens a connection manager for `url`. `key_prefix` is prepended to
    /// every key, letting several deployments share one Redis.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis distributed tier");
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }
}

#[async_trait]
impl DistributedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.full_key(key)).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let _: () = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(self.full_key(key)).await?;
        Ok(removed > 0)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let pattern = scan_pattern(&self.key_prefix, prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = conn.del(&keys).await?;
                removed += deleted;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, removed, "Redis prefix delete finished");
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

fn prefixed(key_prefix: &str, key: &str) -> String {
    format!("{key_prefix}{key}")
}

/// SCAN MATCH pattern selecting every key under `prefix`. Glob
/// metacharacters in the literal part are escaped.
fn scan_pattern(key_prefix: &str, prefix: &str) -> String {
    let mut pattern = String::new();
    for c in key_prefix.chars().chain(prefix.chars()) {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}
