//! Expiry coordination: one absolute TTL clock per session.
//!
//! Every key a session owns must expire at the same instant. A partial
//! refresh (session record renewed, a member's picks left to lapse)
//! would delete submitted data mid-round while the session still looks
//! alive, leaving a permanently stuck round with a phantom non-submitter.
//! [`ExpiryCoordinator::refresh`] therefore applies one scripted
//! multi-key expiry, and is invoked on every externally visible activity.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::locks::SessionLocks;
use crate::domain::session_event::{Audience, SessionEvent};
use crate::domain::{ParticipantId, RoomBus, SessionCode};
use crate::error::CoordinatorError;
use crate::store::{SessionStore, keys};

/// Keeps session keys on a shared expiry clock and propagates expiry
/// events from the store's notification feed.
///
/// The listener is a process-scoped singleton with an explicit
/// [`initialize`](Self::initialize) / [`shutdown`](Self::shutdown)
/// lifecycle, owned by the application state.
#[derive(Debug)]
pub struct ExpiryCoordinator {
    store: Arc<dyn SessionStore>,
    bus: Arc<RoomBus>,
    locks: Arc<SessionLocks>,
    session_ttl: Duration,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryCoordinator {
    /// Creates a coordinator with the given inactivity window.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        bus: Arc<RoomBus>,
        locks: Arc<SessionLocks>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            locks,
            session_ttl,
            listener: Mutex::new(None),
        }
    }

    /// Computes the shared absolute expiry: now plus the TTL window.
    #[must_use]
    pub fn calculate_expire_at(&self) -> DateTime<Utc> {
        Utc::now() + self.session_ttl
    }

    /// Renews the expiry of every key the session owns, atomically.
    ///
    /// Returns the deadline that was applied.
    ///
    /// # Errors
    ///
    /// Returns a store error if the scripted expiry fails; in that case
    /// no key's deadline has changed.
    pub async fn refresh(
        &self,
        code: &SessionCode,
        pids: &[ParticipantId],
    ) -> Result<DateTime<Utc>, CoordinatorError> {
        let expire_at = self.calculate_expire_at();
        self.store
            .expire_all_at(
                &keys::owned_by_session(code, pids),
                expire_at.timestamp_millis(),
            )
            .await?;
        Ok(expire_at)
    }

    /// Reads back the session record's current absolute expiry.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn expires_at(
        &self,
        code: &SessionCode,
    ) -> Result<Option<DateTime<Utc>>, CoordinatorError> {
        let at_ms = self.store.expires_at(&keys::session(code)).await?;
        Ok(at_ms.and_then(DateTime::from_timestamp_millis))
    }

    /// Starts the singleton expiry listener.
    ///
    /// Consumes the store's expired-key feed, filters for exact session
    /// record keys (sub-keys are skipped so one session produces one
    /// event), and broadcasts `session:expired` to the room. If the
    /// store cannot provide the feed the failure is a warning — passive
    /// TTL still purges keys, the expiry just goes unobserved.
    pub async fn initialize(&self) {
        let mut slot = self.listener.lock().await;
        if slot.is_some() {
            return;
        }
        let feed = match self.store.subscribe_expired().await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "expiry notifications unavailable; sessions will expire silently"
                );
                return;
            }
        };

        let bus = Arc::clone(&self.bus);
        let locks = Arc::clone(&self.locks);
        let handle = tokio::spawn(async move {
            let mut feed = feed;
            while let Some(key) = feed.recv().await {
                let Some(code) = keys::parse_session_record_key(&key) else {
                    tracing::debug!(key, "ignoring non-session expired key");
                    continue;
                };
                tracing::info!(%code, "session expired from inactivity");
                bus.publish(
                    Audience::Room,
                    SessionEvent::SessionExpired {
                        code: code.clone(),
                        reason: "inactivity".to_string(),
                        timestamp: Utc::now(),
                    },
                )
                .await;
                bus.remove_room(&code).await;
                locks.purge(&code).await;
            }
            tracing::debug!("expiry listener feed closed");
        });
        *slot = Some(handle);
    }

    /// Stops the expiry listener. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
    }

    /// Whether the listener task is running.
    pub async fn is_listening(&self) -> bool {
        self.listener.lock().await.is_some()
    }
}
