//! Session store port and key schema.
//!
//! The coordinator depends on a narrow set of store capabilities: hash
//! and set operations, set-if-absent, atomic multi-key delete and
//! absolute expiry, expiry readback, and a feed of expired key names.
//! [`SessionStore`] captures exactly that surface; [`redis::RedisStore`]
//! is the production implementation and [`memory::MemoryStore`] backs
//! tests and local development.

pub mod lua;
pub mod memory;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoordinatorError;

/// Store operation failure. Carries backend detail for logging; mapped
/// to the generic internal error at the service boundary.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.0)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Abstract key-value store with TTL support.
///
/// All methods are async I/O against the backing store; none perform
/// CPU-bound blocking work. Multi-key `delete` and `expire_all_at` are
/// atomic: either every key is affected or none.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Writes multiple fields of a hash record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    /// Reads all fields of a hash record. `None` when the key is absent
    /// (or its TTL has lapsed).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>>;

    /// Reads a single hash field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Writes a single hash field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Adds members to a set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<()>;

    /// Removes a member from a set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Returns all members of a set (empty when the key is absent).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Returns the cardinality of a set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn set_len(&self, key: &str) -> StoreResult<u64>;

    /// Returns `true` if the member is in the set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Returns the intersection of the named sets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn set_intersection(&self, keys: &[String]) -> StoreResult<Vec<String>>;

    /// Sets a string value only if the key is absent. Returns `true`
    /// when this call claimed the key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Reads a string value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Deletes the given keys as one atomic operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure; no key is removed then.
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// Sets an identical absolute expiry (unix millis) on every given
    /// key as one atomic operation. Keys that do not exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure; no deadline changes then.
    async fn expire_all_at(&self, keys: &[String], at_ms: i64) -> StoreResult<()>;

    /// Reads a key's absolute expiry in unix millis. `None` when the key
    /// is absent or has no expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn expires_at(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Returns `true` if the key exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Subscribes to the feed of expired key names.
    ///
    /// Implementations that cannot observe expirations (e.g. a backend
    /// with notifications disabled) return a receiver that never yields;
    /// passive TTL still applies.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the subscription cannot be established.
    async fn subscribe_expired(&self) -> StoreResult<mpsc::UnboundedReceiver<String>>;
}

/// Key schema for all store keys owned by the coordinator.
///
/// Every `session:{code}*` key shares the session's expiry clock;
/// `option:{id}` catalog entries expire independently.
pub mod keys {
    use crate::domain::{OptionId, ParticipantId, SessionCode};

    /// `session:{code}` — session record hash.
    #[must_use]
    pub fn session(code: &SessionCode) -> String {
        format!("session:{code}")
    }

    /// `session:{code}:members` — membership set.
    #[must_use]
    pub fn members(code: &SessionCode) -> String {
        format!("session:{code}:members")
    }

    /// `session:{code}:member:{pid}` — participant record hash.
    #[must_use]
    pub fn member(code: &SessionCode, pid: ParticipantId) -> String {
        format!("session:{code}:member:{pid}")
    }

    /// `session:{code}:picks:{pid}` — write-once selection set.
    #[must_use]
    pub fn picks(code: &SessionCode, pid: ParticipantId) -> String {
        format!("session:{code}:picks:{pid}")
    }

    /// `session:{code}:submitted` — ids of members who have submitted.
    #[must_use]
    pub fn submitted(code: &SessionCode) -> String {
        format!("session:{code}:submitted")
    }

    /// `session:{code}:options` — candidate option id set.
    #[must_use]
    pub fn candidates(code: &SessionCode) -> String {
        format!("session:{code}:options")
    }

    /// `session:{code}:results` — persisted overlap set.
    #[must_use]
    pub fn results(code: &SessionCode) -> String {
        format!("session:{code}:results")
    }

    /// `session:{code}:host` — host-claim marker (set-if-absent).
    #[must_use]
    pub fn host(code: &SessionCode) -> String {
        format!("session:{code}:host")
    }

    /// `session:{code}:presence` — advisory presence hash.
    #[must_use]
    pub fn presence(code: &SessionCode) -> String {
        format!("session:{code}:presence")
    }

    /// `option:{id}` — catalog display record (independent TTL).
    #[must_use]
    pub fn option(id: &OptionId) -> String {
        format!("option:{id}")
    }

    /// Every key owned by a session, for cascade deletes and shared
    /// expiry refreshes. The catalog's `option:{id}` records are
    /// deliberately absent — they are not session-owned.
    #[must_use]
    pub fn owned_by_session(code: &SessionCode, pids: &[ParticipantId]) -> Vec<String> {
        let mut keys = vec![
            session(code),
            members(code),
            submitted(code),
            candidates(code),
            results(code),
            host(code),
            presence(code),
        ];
        for pid in pids {
            keys.push(member(code, *pid));
            keys.push(picks(code, *pid));
        }
        keys
    }

    /// Extracts the session code from an expired *session record* key.
    ///
    /// Only the exact `session:{code}` shape matches; sub-keys such as
    /// `session:{code}:members` are rejected so a session expiry is
    /// observed once, not once per owned key.
    #[must_use]
    pub fn parse_session_record_key(key: &str) -> Option<SessionCode> {
        let code = key.strip_prefix("session:")?;
        if code.contains(':') {
            return None;
        }
        SessionCode::parse(code).ok()
    }

    #[cfg(test)]
    #[allow(clippy::panic)]
    mod tests {
        use super::*;

        #[test]
        fn record_key_parses() {
            let code = SessionCode::generate();
            let parsed = parse_session_record_key(&session(&code));
            assert_eq!(parsed, Some(code));
        }

        #[test]
        fn sub_keys_are_rejected() {
            let code = SessionCode::generate();
            let pid = ParticipantId::new();
            assert!(parse_session_record_key(&members(&code)).is_none());
            assert!(parse_session_record_key(&picks(&code, pid)).is_none());
            assert!(parse_session_record_key(&host(&code)).is_none());
        }

        #[test]
        fn unrelated_keys_are_rejected() {
            assert!(parse_session_record_key("option:place-1").is_none());
            assert!(parse_session_record_key("session:short").is_none());
            assert!(parse_session_record_key("session:").is_none());
        }
    }
}
