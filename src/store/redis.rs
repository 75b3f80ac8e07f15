//! Redis-backed store adapter.
//!
//! A thin mapping from the [`Store`](super::Store) primitives onto Redis
//! commands over a multiplexed async connection. The connection handle is
//! cheap to clone; every operation clones it so `&self` methods can issue
//! commands concurrently.

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::{Result, Store};

/// A `Store` backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connects to the Redis server at `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(RedisStore { conn })
    }

    /// Wraps an existing connection (used when the caller manages the client).
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        RedisStore { conn }
    }
}

impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.conn.clone().get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.clone().set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        if ttl_secs == 0 {
            return self.set(key, value).await;
        }
        self.conn
            .clone()
            .set_ex::<_, _, ()>(key, value, ttl_secs)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn.clone().del::<_, ()>(key).await?;
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.conn.clone().keys(pattern).await?;
        // KEYS returns server order; sort for parity with the in-memory store
        keys.sort();
        Ok(keys)
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<()> {
        self.conn.clone().rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        let values: Vec<String> = self.conn.clone().lrange(key, 0, -1).await?;
        Ok(values)
    }

    async fn set_add(&self, key: &str, value: &str) -> Result<()> {
        self.conn.clone().sadd::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, value: &str) -> Result<()> {
        self.conn.clone().srem::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_all(&self, key: &str) -> Result<Vec<String>> {
        let values: Vec<String> = self.conn.clone().smembers(key).await?;
        Ok(values)
    }
}
