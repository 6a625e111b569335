//! Session registry: canonical session records and their state machine.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{GeoParams, ParticipantId, SessionCode, SessionRecord, SessionState};
use crate::error::CoordinatorError;
use crate::store::{SessionStore, keys};

/// Bounded attempt count for code generation. With a 36^6 keyspace a
/// collision is astronomically unlikely; running out is still an error,
/// not an assumption.
const MAX_CODE_ATTEMPTS: u32 = 8;

/// Owns session records and enforces the lifecycle state machine.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
}

impl SessionRegistry {
    /// Creates a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Creates a session in the `Waiting` state with no members.
    ///
    /// The creator's display name is recorded for labeling; their
    /// membership (and host status) is established when they join over
    /// the realtime channel.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::CodeGenerationExhausted`] if every
    /// candidate code collided, or a store error.
    pub async fn create_session(
        &self,
        host_name: Option<String>,
        geo: Option<GeoParams>,
    ) -> Result<(SessionCode, SessionRecord), CoordinatorError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = SessionCode::generate();
            if self.store.exists(&keys::session(&code)).await? {
                tracing::warn!(%code, "session code collision, retrying");
                continue;
            }
            let record = SessionRecord::new(host_name.clone(), geo);
            self.store
                .hash_set(&keys::session(&code), &record.to_fields())
                .await?;
            tracing::info!(%code, "session created");
            return Ok((code, record));
        }
        Err(CoordinatorError::CodeGenerationExhausted)
    }

    /// Fetches a session record.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::SessionNotFound`] when the record is
    /// absent or its TTL has lapsed.
    pub async fn get_session(&self, code: &SessionCode) -> Result<SessionRecord, CoordinatorError> {
        let fields = self
            .store
            .hash_get_all(&keys::session(code))
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound(code.to_string()))?;
        SessionRecord::from_fields(&fields)
            .ok_or_else(|| CoordinatorError::Internal(format!("corrupt session record {code}")))
    }

    /// Transitions a session to a new lifecycle state.
    ///
    /// Callers must only request states reachable from the current one;
    /// an unreachable transition is a programming error, asserted under
    /// test profiles and reported as internal in release.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::SessionNotFound`] for absent sessions
    /// and [`CoordinatorError::Internal`] for illegal transitions.
    pub async fn transition_state(
        &self,
        code: &SessionCode,
        next: SessionState,
    ) -> Result<(), CoordinatorError> {
        let record = self.get_session(code).await?;
        if !record.state.can_transition(next) {
            debug_assert!(
                false,
                "illegal session transition {} -> {next}",
                record.state
            );
            return Err(CoordinatorError::Internal(format!(
                "illegal session transition {} -> {next}",
                record.state
            )));
        }
        self.store
            .hash_set_field(&keys::session(code), "state", next.as_str())
            .await?;
        tracing::debug!(%code, from = %record.state, to = %next, "session state changed");
        Ok(())
    }

    /// Updates the last-activity timestamp. Callers pair this with an
    /// expiry refresh.
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails.
    pub async fn touch(&self, code: &SessionCode) -> Result<(), CoordinatorError> {
        self.store
            .hash_set_field(
                &keys::session(code),
                "last_activity_at",
                &Utc::now().to_rfc3339(),
            )
            .await?;
        Ok(())
    }

    /// Deletes a session and every key it owns in one atomic operation.
    ///
    /// Returns the member ids that were cascaded, so callers can release
    /// per-participant resources.
    ///
    /// # Errors
    ///
    /// Returns a store error if the cascade fails; in that case no key
    /// has been removed.
    pub async fn delete_session(
        &self,
        code: &SessionCode,
    ) -> Result<Vec<ParticipantId>, CoordinatorError> {
        let pids: Vec<ParticipantId> = self
            .store
            .set_members(&keys::members(code))
            .await?
            .iter()
            .filter_map(|s| ParticipantId::parse(s))
            .collect();
        self.store
            .delete(&keys::owned_by_session(code, &pids))
            .await?;
        tracing::info!(%code, members = pids.len(), "session deleted");
        Ok(pids)
    }
}
