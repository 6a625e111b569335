//! Redis-backed [`SessionStore`] implementation.
//!
//! # Key Patterns
//!
//! - `session:{code}` — session record (HASH)
//! - `session:{code}:members` / `:submitted` / `:options` / `:results` —
//!   sets on the session's expiry clock
//! - `session:{code}:member:{pid}` / `:picks:{pid}` — per-participant keys
//! - `option:{id}` — catalog display record (independent TTL)
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and designed
//! for concurrent use; every operation clones it instead of locking. The
//! expired-key feed uses a dedicated pub/sub connection because a
//! subscription occupies its connection exclusively.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{SessionStore, StoreError, StoreResult, lua};

/// Keyspace-notification pattern for expired keys on any database.
const EXPIRED_PATTERN: &str = "__keyevent@*__:expired";

/// Redis session store.
///
/// Cheaply cloneable. Atomic multi-key expiry runs the precompiled
/// [`lua::EXPIRE_ALL_AT`] script; multi-key deletes use a single `DEL`,
/// which Redis executes atomically.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: MultiplexedConnection,
    expire_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the URL is invalid or the initial
    /// connection fails. The URL is not logged — it may embed credentials.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError(format!("failed to open redis client: {e}")))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError(format!("failed to connect to redis: {e}")))?;
        Ok(Self {
            client,
            connection,
            expire_script: Script::new(lua::EXPIRE_ALL_AT),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    fn op_err(op: &str, e: &redis::RedisError) -> StoreError {
        warn!(target: "tablepick.store.redis", error = %e, op, "redis operation failed");
        StoreError(format!("{op}: {e}"))
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(|e| Self::op_err("hset", &e))?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        let mut conn = self.conn();
        let map: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .map_err(|e| Self::op_err("hgetall", &e))?;
        // Redis reports a missing hash as an empty map.
        Ok(if map.is_empty() { None } else { Some(map) })
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        conn.hget(key, field)
            .await
            .map_err(|e| Self::op_err("hget", &e))
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn
            .hset(key, field, value)
            .await
            .map_err(|e| Self::op_err("hset", &e))?;
        Ok(())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn
            .sadd(key, members)
            .await
            .map_err(|e| Self::op_err("sadd", &e))?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn
            .srem(key, member)
            .await
            .map_err(|e| Self::op_err("srem", &e))?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        conn.smembers(key)
            .await
            .map_err(|e| Self::op_err("smembers", &e))
    }

    async fn set_len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        conn.scard(key)
            .await
            .map_err(|e| Self::op_err("scard", &e))
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        conn.sismember(key, member)
            .await
            .map_err(|e| Self::op_err("sismember", &e))
    }

    async fn set_intersection(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        conn.sinter(keys)
            .await
            .map_err(|e| Self::op_err("sinter", &e))
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        conn.set_nx(key, value)
            .await
            .map_err(|e| Self::op_err("setnx", &e))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(|e| Self::op_err("get", &e))
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn
            .del(keys)
            .await
            .map_err(|e| Self::op_err("del", &e))?;
        Ok(())
    }

    async fn expire_all_at(&self, keys: &[String], at_ms: i64) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let mut invocation = self.expire_script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        let touched: i64 = invocation
            .arg(at_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::op_err("expire_all_at", &e))?;
        debug!(
            target: "tablepick.store.redis",
            keys = keys.len(),
            touched,
            at_ms,
            "applied shared expiry"
        );
        Ok(())
    }

    async fn expires_at(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn();
        let at: i64 = redis::cmd("PEXPIRETIME")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::op_err("pexpiretime", &e))?;
        // -2: key missing; -1: key has no expiry.
        Ok(if at < 0 { None } else { Some(at) })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        conn.exists(key)
            .await
            .map_err(|e| Self::op_err("exists", &e))
    }

    async fn subscribe_expired(&self) -> StoreResult<mpsc::UnboundedReceiver<String>> {
        // Keyspace notifications require server-side enablement. Some
        // deployments disable CONFIG SET entirely; passive TTL still
        // works there, so this is a warning rather than a failure.
        let mut conn = self.conn();
        let enabled: Result<(), redis::RedisError> = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut conn)
            .await;
        if let Err(e) = enabled {
            warn!(
                target: "tablepick.store.redis",
                error = %e,
                "could not enable keyspace notifications; expiry events will not be observed"
            );
        }

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Self::op_err("pubsub connect", &e))?;
        pubsub
            .psubscribe(EXPIRED_PATTERN)
            .await
            .map_err(|e| Self::op_err("psubscribe", &e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                match msg.get_payload::<String>() {
                    Ok(key) => {
                        if tx.send(key).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(
                            target: "tablepick.store.redis",
                            error = %e,
                            "ignoring malformed expiry notification"
                        );
                    }
                }
            }
            debug!(target: "tablepick.store.redis", "expiry notification stream closed");
        });
        Ok(rx)
    }
}
