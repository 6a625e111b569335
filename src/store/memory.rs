//! In-memory [`SessionStore`] implementation.
//!
//! Backs the test suites and local development without a Redis instance.
//! Implements the same observable semantics as the Redis store: absolute
//! expiries shared across keys, lazy expiry on access, and an expired-key
//! feed driven by a background sweeper.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock, mpsc};

use super::{SessionStore, StoreError, StoreResult};

/// Sweep interval for the background expiry scanner.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// Absolute expiry in unix millis; `None` means no expiry.
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

#[derive(Debug)]
struct Inner {
    entries: RwLock<HashMap<String, Entry>>,
    expired_feeds: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl Inner {
    async fn notify_expired(&self, key: &str) {
        let mut feeds = self.expired_feeds.lock().await;
        feeds.retain(|tx| tx.send(key.to_string()).is_ok());
    }
}

/// In-memory store with TTL semantics and an expired-key feed.
///
/// Cheaply cloneable; clones share the same state. The background
/// sweeper stops when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store and spawns its expiry sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            entries: RwLock::new(HashMap::new()),
            expired_feeds: Mutex::new(Vec::new()),
        });
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let now_ms = Utc::now().timestamp_millis();
                let expired: Vec<String> = {
                    let mut entries = inner.entries.write().await;
                    let keys: Vec<String> = entries
                        .iter()
                        .filter(|(_, entry)| entry.is_expired(now_ms))
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in &keys {
                        entries.remove(key);
                    }
                    keys
                };
                for key in expired {
                    inner.notify_expired(&key).await;
                }
            }
        });
        Self { inner }
    }

    /// Reads an entry, removing it (and notifying the feed) if its TTL
    /// has lapsed before the sweeper got to it.
    async fn live_entry(&self, key: &str) -> Option<Entry> {
        let now_ms = Utc::now().timestamp_millis();
        let expired = {
            let entries = self.inner.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_expired(now_ms) => true,
                Some(entry) => return Some(entry.clone()),
                None => return None,
            }
        };
        if expired {
            self.inner.entries.write().await.remove(key);
            self.inner.notify_expired(key).await;
        }
        None
    }

    async fn with_hash<F>(&self, key: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        // A write to a lapsed key must create a fresh one, as Redis does.
        let _ = self.live_entry(key).await;
        let mut entries = self.inner.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            Value::Hash(map) => {
                f(map);
                Ok(())
            }
            _ => Err(StoreError(format!("{key} is not a hash"))),
        }
    }

    async fn with_set<F>(&self, key: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut HashSet<String>),
    {
        let _ = self.live_entry(key).await;
        let mut entries = self.inner.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            Value::Set(set) => {
                f(set);
                Ok(())
            }
            _ => Err(StoreError(format!("{key} is not a set"))),
        }
    }

    async fn read_set(&self, key: &str) -> StoreResult<HashSet<String>> {
        match self.live_entry(key).await {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set),
            Some(_) => Err(StoreError(format!("{key} is not a set"))),
            None => Ok(HashSet::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        self.with_hash(key, |map| {
            for (field, value) in fields {
                map.insert(field.clone(), value.clone());
            }
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        match self.live_entry(key).await {
            Some(Entry {
                value: Value::Hash(map),
                ..
            }) => Ok(Some(map)),
            Some(_) => Err(StoreError(format!("{key} is not a hash"))),
            None => Ok(None),
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self
            .hash_get_all(key)
            .await?
            .and_then(|map| map.get(field).cloned()))
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.with_hash(key, |map| {
            map.insert(field.to_string(), value.to_string());
        })
        .await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.with_set(key, |set| {
            for member in members {
                set.insert(member.clone());
            }
        })
        .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        self.with_set(key, |set| {
            set.remove(member);
        })
        .await
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.read_set(key).await?.into_iter().collect())
    }

    async fn set_len(&self, key: &str) -> StoreResult<u64> {
        Ok(self.read_set(key).await?.len() as u64)
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.read_set(key).await?.contains(member))
    }

    async fn set_intersection(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut acc = self.read_set(first).await?;
        for key in rest {
            let next = self.read_set(key).await?;
            acc.retain(|member| next.contains(member));
            if acc.is_empty() {
                break;
            }
        }
        Ok(acc.into_iter().collect())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        // Resolve lazy expiry first so a lapsed marker can be reclaimed.
        let _ = self.live_entry(key).await;
        let mut entries = self.inner.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at_ms: None,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.live_entry(key).await {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(StoreError(format!("{key} is not a string"))),
            None => Ok(None),
        }
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        let mut entries = self.inner.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn expire_all_at(&self, keys: &[String], at_ms: i64) -> StoreResult<()> {
        let mut entries = self.inner.entries.write().await;
        for key in keys {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at_ms = Some(at_ms);
            }
        }
        Ok(())
    }

    async fn expires_at(&self, key: &str) -> StoreResult<Option<i64>> {
        Ok(self.live_entry(key).await.and_then(|e| e.expires_at_ms))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn subscribe_expired(&self) -> StoreResult<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.expired_feeds.lock().await.push(tx);
        Ok(rx)
    }
}
