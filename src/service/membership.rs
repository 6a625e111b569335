//! Membership and presence tracking.
//!
//! The membership set is the authoritative roster of a session.
//! Disconnect is not removal: connectivity loss only flips the advisory
//! presence flag, preserving membership, host status, and any submitted
//! selection. Removing on disconnect would corrupt the agreement
//! computation and could silently drop the host slot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Participant, ParticipantId, SessionCode};
use crate::error::CoordinatorError;
use crate::store::{SessionStore, keys};

/// Hard cap on members per session.
pub const MAX_PARTICIPANTS: u64 = 4;

/// Tracks the participant roster, host marker, and presence flags.
#[derive(Debug, Clone)]
pub struct MembershipTracker {
    store: Arc<dyn SessionStore>,
}

impl MembershipTracker {
    /// Creates a tracker over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Atomically claims the host slot for `pid`. Returns `true` for the
    /// first claimer only; later calls (and later joiners) see `false`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the claim write fails.
    pub async fn claim_host(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<bool, CoordinatorError> {
        Ok(self
            .store
            .set_if_absent(&keys::host(code), &pid.to_string())
            .await?)
    }

    /// Registers a participant. Callers must hold the session's critical
    /// section and must have decided `is_host` via [`Self::claim_host`].
    ///
    /// The membership set and `participant_count` are written together,
    /// keeping the count equal to the set's cardinality.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::SessionFull`] at the member cap, or a
    /// store error.
    pub async fn add_participant(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
        display_name: String,
        is_host: bool,
    ) -> Result<Participant, CoordinatorError> {
        let current = self.store.set_len(&keys::members(code)).await?;
        if current >= MAX_PARTICIPANTS {
            return Err(CoordinatorError::SessionFull(code.to_string()));
        }

        let participant = Participant::new(pid, display_name, is_host);
        self.store
            .hash_set(&keys::member(code, pid), &participant.to_fields())
            .await?;
        self.store
            .set_add(&keys::members(code), &[pid.to_string()])
            .await?;
        self.write_count(code).await?;
        self.mark_online(code, pid).await?;

        tracing::info!(%code, %pid, is_host, "participant joined");
        Ok(participant)
    }

    /// Removes a participant on intentional leave. Deletes their record
    /// and selection set and decrements the count with the set mutation.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::ParticipantNotFound`] if the id is not
    /// a member, or a store error.
    pub async fn remove_participant(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<Participant, CoordinatorError> {
        let participant = self
            .get_participant(code, pid)
            .await?
            .ok_or_else(|| CoordinatorError::ParticipantNotFound(code.to_string()))?;

        self.store
            .set_remove(&keys::members(code), &pid.to_string())
            .await?;
        self.store
            .set_remove(&keys::submitted(code), &pid.to_string())
            .await?;
        self.store
            .delete(&[keys::member(code, pid), keys::picks(code, pid)])
            .await?;
        self.write_count(code).await?;

        tracing::info!(%code, %pid, "participant left");
        Ok(participant)
    }

    /// Authorization gate: is this connection currently a member?
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn is_in_session(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<bool, CoordinatorError> {
        Ok(self
            .store
            .set_contains(&keys::members(code), &pid.to_string())
            .await?)
    }

    /// Fetches one participant record, `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn get_participant(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<Option<Participant>, CoordinatorError> {
        let Some(fields) = self.store.hash_get_all(&keys::member(code, pid)).await? else {
            return Ok(None);
        };
        Ok(Participant::from_fields(pid, &fields))
    }

    /// Lists all member records, earliest joiner first.
    ///
    /// # Errors
    ///
    /// Returns a store error if any lookup fails.
    pub async fn list_participants(
        &self,
        code: &SessionCode,
    ) -> Result<Vec<Participant>, CoordinatorError> {
        let mut participants = Vec::new();
        for raw in self.store.set_members(&keys::members(code)).await? {
            let Some(pid) = ParticipantId::parse(&raw) else {
                continue;
            };
            if let Some(participant) = self.get_participant(code, pid).await? {
                participants.push(participant);
            }
        }
        participants.sort_by_key(|p| p.joined_at);
        Ok(participants)
    }

    /// Returns the member ids of a session.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn member_ids(
        &self,
        code: &SessionCode,
    ) -> Result<Vec<ParticipantId>, CoordinatorError> {
        Ok(self
            .store
            .set_members(&keys::members(code))
            .await?
            .iter()
            .filter_map(|s| ParticipantId::parse(s))
            .collect())
    }

    /// Returns the current member count.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn member_count(&self, code: &SessionCode) -> Result<u64, CoordinatorError> {
        Ok(self.store.set_len(&keys::members(code)).await?)
    }

    // ── Presence (advisory, never gates game logic) ─────────────────────

    /// Marks a participant online. No-op for unknown participants.
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails.
    pub async fn mark_online(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<(), CoordinatorError> {
        self.set_presence(code, pid, true).await
    }

    /// Marks a participant offline. No-op for unknown participants.
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails.
    pub async fn mark_offline(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<(), CoordinatorError> {
        self.set_presence(code, pid, false).await
    }

    /// Returns a participant's presence flag. Absence means offline.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn is_online(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<bool, CoordinatorError> {
        Ok(self
            .store
            .hash_get(&keys::presence(code), &pid.to_string())
            .await?
            .as_deref()
            == Some("1"))
    }

    /// Lists the ids of members currently marked online.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn list_online(
        &self,
        code: &SessionCode,
    ) -> Result<Vec<ParticipantId>, CoordinatorError> {
        Ok(self
            .presence_map(code)
            .await?
            .into_iter()
            .filter_map(|(pid, online)| online.then_some(pid))
            .collect())
    }

    /// Batch presence lookup over the current membership.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn presence_map(
        &self,
        code: &SessionCode,
    ) -> Result<HashMap<ParticipantId, bool>, CoordinatorError> {
        let flags = self
            .store
            .hash_get_all(&keys::presence(code))
            .await?
            .unwrap_or_default();
        let mut map = HashMap::new();
        for pid in self.member_ids(code).await? {
            let online = flags.get(&pid.to_string()).map(String::as_str) == Some("1");
            map.insert(pid, online);
        }
        Ok(map)
    }

    async fn set_presence(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
        online: bool,
    ) -> Result<(), CoordinatorError> {
        if !self.is_in_session(code, pid).await? {
            return Ok(());
        }
        self.store
            .hash_set_field(
                &keys::presence(code),
                &pid.to_string(),
                if online { "1" } else { "0" },
            )
            .await?;
        Ok(())
    }

    async fn write_count(&self, code: &SessionCode) -> Result<(), CoordinatorError> {
        let count = self.store.set_len(&keys::members(code)).await?;
        self.store
            .hash_set_field(&keys::session(code), "participant_count", &count.to_string())
            .await?;
        Ok(())
    }
}
