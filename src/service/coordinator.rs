//! Session service: orchestrates all session operations and emits events.
//!
//! Every mutation method follows the pattern: validate → acquire the
//! session's critical section → read state → conditionally write →
//! refresh the expiry clock → publish events → return the acknowledgment
//! payload. Broadcasts targeted at the actor are avoided via
//! `Audience::RoomExcept`, so the transport's direct acknowledgment is
//! always the actor's first sight of their own action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::expiry::ExpiryCoordinator;
use super::locks::SessionLocks;
use super::membership::MembershipTracker;
use super::registry::SessionRegistry;
use super::selections::{OverlapResult, SelectionStore};
use crate::domain::session_event::{Audience, SessionEvent};
use crate::domain::{
    CandidateOption, GeoParams, OptionId, ParticipantId, RoomBus, SessionCode, SessionRecord,
    SessionState,
};
use crate::error::CoordinatorError;
use crate::store::SessionStore;

/// Upper bound on display name length.
pub const MAX_NAME_LEN: usize = 32;
/// Upper bound on options in a single submission.
pub const MAX_SELECTIONS: usize = 50;
/// Upper bound on candidate options per session.
pub const MAX_CANDIDATES: usize = 100;

/// Public view of one member inside a [`SessionSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    /// Display name.
    pub display_name: String,
    /// Whether this member has submitted this round.
    pub has_submitted: bool,
    /// Whether this member holds the host slot.
    pub is_host: bool,
    /// Advisory presence flag.
    pub online: bool,
}

/// Public snapshot of a session, safe to show to any caller: selection
/// contents never appear here, only counts and flags.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session code.
    pub code: SessionCode,
    /// Lifecycle state.
    pub state: SessionState,
    /// Member count.
    pub participant_count: u32,
    /// Members who have submitted this round.
    pub submitted_count: u32,
    /// Creator's display name, if given.
    pub host_name: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Shared absolute expiry of the session's state, if set.
    pub expires_at: Option<DateTime<Utc>>,
    /// Member summaries, earliest joiner first.
    pub participants: Vec<ParticipantSummary>,
}

/// Acknowledgment payload for a successful join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    /// The joiner's connection-scoped identity.
    pub participant_id: ParticipantId,
    /// Whether the joiner claimed the host slot.
    pub is_host: bool,
    /// Session snapshot after the join.
    pub session: SessionSnapshot,
}

/// Acknowledgment payload for a successful submission. Counts only; the
/// results (if this submission completed the round) arrive as a
/// `session:results` broadcast to the whole room.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    /// Members who have submitted after this call.
    pub submitted_count: u32,
    /// Total member count.
    pub participant_count: u32,
    /// Whether this submission completed the round.
    pub completed_round: bool,
}

/// Orchestration layer for all session operations (the service surface
/// consumed by both the REST and WebSocket transports).
#[derive(Debug, Clone)]
pub struct SessionService {
    registry: SessionRegistry,
    membership: MembershipTracker,
    selections: SelectionStore,
    expiry: Arc<ExpiryCoordinator>,
    bus: Arc<RoomBus>,
    locks: Arc<SessionLocks>,
}

impl SessionService {
    /// Creates the service over a store, bus, lock table, and expiry
    /// coordinator.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        bus: Arc<RoomBus>,
        locks: Arc<SessionLocks>,
        expiry: Arc<ExpiryCoordinator>,
        catalog_ttl: Duration,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(Arc::clone(&store)),
            membership: MembershipTracker::new(Arc::clone(&store)),
            selections: SelectionStore::new(store, catalog_ttl),
            expiry,
            bus,
            locks,
        }
    }

    /// Returns the room bus (the transport subscribes connections here).
    #[must_use]
    pub fn bus(&self) -> &Arc<RoomBus> {
        &self.bus
    }

    /// Returns the expiry coordinator.
    #[must_use]
    pub fn expiry(&self) -> &Arc<ExpiryCoordinator> {
        &self.expiry
    }

    /// Creates a session and stores its candidate options.
    ///
    /// The creator is not yet a member: host status is claimed when they
    /// join over the realtime channel like everyone else.
    ///
    /// # Errors
    ///
    /// Validation, code-exhaustion, or store errors.
    pub async fn create_session(
        &self,
        host_name: &str,
        geo: Option<GeoParams>,
        options: &[CandidateOption],
    ) -> Result<(SessionCode, SessionSnapshot), CoordinatorError> {
        let host_name = validate_name(host_name)?;
        if options.is_empty() || options.len() > MAX_CANDIDATES {
            return Err(CoordinatorError::InvalidSelection(format!(
                "candidate list must have 1..={MAX_CANDIDATES} options"
            )));
        }

        let (code, record) = self.registry.create_session(Some(host_name), geo).await?;
        self.selections.set_candidates(&code, options).await?;
        let expires_at = self.expiry.refresh(&code, &[]).await?;

        let snapshot = self
            .snapshot_from(&code, &record, Some(expires_at))
            .await?;
        Ok((code, snapshot))
    }

    /// Fetches a public session snapshot.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for absent/expired codes, validation errors for
    /// malformed codes, or store errors.
    pub async fn get_session(&self, code: &str) -> Result<SessionSnapshot, CoordinatorError> {
        let code = SessionCode::parse(code)?;
        let record = self.registry.get_session(&code).await?;
        let expires_at = self.expiry.expires_at(&code).await?;
        self.snapshot_from(&code, &record, expires_at).await
    }

    /// Joins a session as a new participant.
    ///
    /// The first joiner atomically claims the host slot. The returned
    /// acknowledgment must reach the joiner before the room's
    /// `participant:joined` broadcast — guaranteed here because that
    /// broadcast excludes the joiner entirely.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `SessionFull`, validation, or store errors.
    pub async fn join_session(
        &self,
        code: &str,
        pid: ParticipantId,
        display_name: &str,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let display_name = validate_name(display_name)?;
        let code = SessionCode::parse(code)?;

        let _guard = self.locks.lock(&code).await;
        let record = self.registry.get_session(&code).await?;
        if record.state == SessionState::Complete {
            // A finished round has announced its results; admitting a new
            // member would silently change the agreement denominator.
            return Err(CoordinatorError::RoundComplete(code.to_string()));
        }

        let is_host = self.membership.claim_host(&code, pid).await?;
        let participant = self
            .membership
            .add_participant(&code, pid, display_name.clone(), is_host)
            .await?;

        self.registry.touch(&code).await?;
        let pids = self.membership.member_ids(&code).await?;
        let expires_at = self.expiry.refresh(&code, &pids).await?;

        let count = u32::try_from(pids.len()).unwrap_or(u32::MAX);
        self.bus
            .publish(
                Audience::RoomExcept(pid),
                SessionEvent::ParticipantJoined {
                    code: code.clone(),
                    participant_id: pid,
                    display_name,
                    participant_count: count,
                    timestamp: Utc::now(),
                },
            )
            .await;

        let record = SessionRecord {
            participant_count: count,
            ..record
        };
        let session = self
            .snapshot_from(&code, &record, Some(expires_at))
            .await?;
        Ok(JoinOutcome {
            participant_id: pid,
            is_host: participant.is_host,
            session,
        })
    }

    /// Records a participant's picks and completes the round when this
    /// was the last outstanding submission.
    ///
    /// The count-only `participant:submitted` broadcast excludes the
    /// submitter; when the round completes, `session:results` follows it
    /// to the whole room, published only after the overlap is computed
    /// and persisted.
    ///
    /// # Errors
    ///
    /// `NotInSession` for non-members, `InvalidOptions`,
    /// `AlreadySubmitted`, validation, or store errors.
    pub async fn submit_selections(
        &self,
        code: &str,
        pid: ParticipantId,
        option_ids: &[OptionId],
    ) -> Result<SubmitOutcome, CoordinatorError> {
        let code = SessionCode::parse(code)?;
        if option_ids.is_empty() || option_ids.len() > MAX_SELECTIONS {
            return Err(CoordinatorError::InvalidSelection(format!(
                "selection list must have 1..={MAX_SELECTIONS} options"
            )));
        }

        let _guard = self.locks.lock(&code).await;
        let record = self.registry.get_session(&code).await?;
        if !self.membership.is_in_session(&code, pid).await? {
            return Err(CoordinatorError::NotInSession(code.to_string()));
        }

        self.selections.submit(&code, pid, option_ids).await?;
        if record.state == SessionState::Waiting {
            // First submission of the round; the UI drives this
            // transition implicitly.
            self.registry
                .transition_state(&code, SessionState::Selecting)
                .await?;
        }

        let submitted = self.selections.submitted_count(&code).await?;
        let members = self.membership.member_count(&code).await?;

        self.bus
            .publish(
                Audience::RoomExcept(pid),
                SessionEvent::ParticipantSubmitted {
                    code: code.clone(),
                    submitted_count: u32::try_from(submitted).unwrap_or(u32::MAX),
                    participant_count: u32::try_from(members).unwrap_or(u32::MAX),
                    timestamp: Utc::now(),
                },
            )
            .await;

        // Completion check runs inside the same critical section as the
        // submission, so exactly one request observes the final count.
        let completed_round = submitted == members;
        if completed_round {
            self.complete_round(&code).await?;
        }

        self.registry.touch(&code).await?;
        let pids = self.membership.member_ids(&code).await?;
        self.expiry.refresh(&code, &pids).await?;

        Ok(SubmitOutcome {
            submitted_count: u32::try_from(submitted).unwrap_or(u32::MAX),
            participant_count: u32::try_from(members).unwrap_or(u32::MAX),
            completed_round,
        })
    }

    /// Resets a completed session for a fresh round. Membership and host
    /// assignment are untouched; picks, submitted flags, and stored
    /// results are cleared.
    ///
    /// Unlike submit's count broadcast, `session:restarted` goes to the
    /// whole room including the initiator — a restart is a shared reset,
    /// not a private fact.
    ///
    /// # Errors
    ///
    /// `NotInSession` for non-members, `RestartUnavailable` while a
    /// round is still in progress, or store errors.
    pub async fn restart_session(
        &self,
        code: &str,
        pid: ParticipantId,
    ) -> Result<SessionSnapshot, CoordinatorError> {
        let code = SessionCode::parse(code)?;

        let _guard = self.locks.lock(&code).await;
        let record = self.registry.get_session(&code).await?;
        if !self.membership.is_in_session(&code, pid).await? {
            return Err(CoordinatorError::NotInSession(code.to_string()));
        }
        if record.state != SessionState::Complete {
            return Err(CoordinatorError::RestartUnavailable(code.to_string()));
        }

        let pids = self.membership.member_ids(&code).await?;
        self.selections.clear_all(&code, &pids).await?;
        self.registry
            .transition_state(&code, SessionState::Selecting)
            .await?;

        self.registry.touch(&code).await?;
        let expires_at = self.expiry.refresh(&code, &pids).await?;

        self.bus
            .publish(
                Audience::Room,
                SessionEvent::SessionRestarted {
                    code: code.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;

        let record = self.registry.get_session(&code).await?;
        self.snapshot_from(&code, &record, Some(expires_at)).await
    }

    /// Removes a participant who intentionally leaves. Their record and
    /// selection set are deleted and the remaining room is told with the
    /// decremented count.
    ///
    /// # Errors
    ///
    /// `NotInSession` for non-members, or store errors.
    pub async fn leave_session(
        &self,
        code: &str,
        pid: ParticipantId,
    ) -> Result<(), CoordinatorError> {
        let code = SessionCode::parse(code)?;

        let _guard = self.locks.lock(&code).await;
        self.registry.get_session(&code).await?;
        if !self.membership.is_in_session(&code, pid).await? {
            return Err(CoordinatorError::NotInSession(code.to_string()));
        }

        let participant = self.membership.remove_participant(&code, pid).await?;
        self.registry.touch(&code).await?;
        let pids = self.membership.member_ids(&code).await?;
        self.expiry.refresh(&code, &pids).await?;

        self.bus
            .publish(
                Audience::RoomExcept(pid),
                SessionEvent::ParticipantLeft {
                    code: code.clone(),
                    participant_id: pid,
                    display_name: participant.display_name,
                    participant_count: u32::try_from(pids.len()).unwrap_or(u32::MAX),
                    timestamp: Utc::now(),
                },
            )
            .await;
        Ok(())
    }

    /// Best-effort disconnect handling. Membership, host status, and any
    /// submitted selection are preserved; only the presence flag flips
    /// and the room is informed with the *unchanged* participant count.
    ///
    /// Never fails: there is no caller waiting for a response, so errors
    /// are logged and swallowed.
    pub async fn handle_disconnect(&self, code: &SessionCode, pid: ParticipantId) {
        if let Err(e) = self.membership.mark_offline(code, pid).await {
            tracing::warn!(%code, %pid, error = %e, "disconnect presence update failed");
        }

        let display_name = match self.membership.get_participant(code, pid).await {
            Ok(Some(participant)) => participant.display_name,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(%code, %pid, error = %e, "disconnect lookup failed");
                return;
            }
        };
        let count = match self.membership.member_count(code).await {
            Ok(count) => u32::try_from(count).unwrap_or(u32::MAX),
            Err(e) => {
                tracing::warn!(%code, %pid, error = %e, "disconnect count lookup failed");
                return;
            }
        };

        self.bus
            .publish(
                Audience::RoomExcept(pid),
                SessionEvent::ParticipantLeft {
                    code: code.clone(),
                    participant_id: pid,
                    display_name,
                    participant_count: count,
                    timestamp: Utc::now(),
                },
            )
            .await;
    }

    /// Administrative teardown: announces the end to the room, deletes
    /// every owned key atomically, and releases in-process resources.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or store errors; on store failure no key has
    /// been removed.
    pub async fn delete_session(&self, code: &str) -> Result<(), CoordinatorError> {
        let code = SessionCode::parse(code)?;
        let _guard = self.locks.lock(&code).await;
        self.registry.get_session(&code).await?;

        self.bus
            .publish(
                Audience::Room,
                SessionEvent::SessionExpired {
                    code: code.clone(),
                    reason: "deleted".to_string(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        self.registry.delete_session(&code).await?;
        self.bus.remove_room(&code).await;
        self.locks.purge(&code).await;
        Ok(())
    }

    /// Completes the round: state transition, overlap computation and
    /// persistence, then the whole-room results broadcast — in that
    /// order, so results are only announced once they are durable.
    async fn complete_round(&self, code: &SessionCode) -> Result<(), CoordinatorError> {
        self.registry
            .transition_state(code, SessionState::Complete)
            .await?;

        let participants = self.membership.list_participants(code).await?;
        let OverlapResult {
            overlapping,
            all_selections,
            has_overlap,
        } = self.selections.calculate_overlap(code, &participants).await?;

        self.bus
            .publish(
                Audience::Room,
                SessionEvent::SessionResults {
                    code: code.clone(),
                    overlapping,
                    all_selections,
                    has_overlap,
                    timestamp: Utc::now(),
                },
            )
            .await;
        tracing::info!(%code, has_overlap, "round completed");
        Ok(())
    }

    async fn snapshot_from(
        &self,
        code: &SessionCode,
        record: &SessionRecord,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SessionSnapshot, CoordinatorError> {
        let participants = self.membership.list_participants(code).await?;
        let presence: HashMap<ParticipantId, bool> = self.membership.presence_map(code).await?;
        let submitted = self.selections.submitted_count(code).await?;

        let summaries = participants
            .into_iter()
            .map(|p| ParticipantSummary {
                online: presence.get(&p.id).copied().unwrap_or(false),
                display_name: p.display_name,
                has_submitted: p.has_submitted,
                is_host: p.is_host,
            })
            .collect();

        Ok(SessionSnapshot {
            code: code.clone(),
            state: record.state,
            participant_count: record.participant_count,
            submitted_count: u32::try_from(submitted).unwrap_or(u32::MAX),
            host_name: record.host_name.clone(),
            created_at: record.created_at,
            expires_at,
            participants: summaries,
        })
    }
}

/// Validates a display name: non-empty after trimming, bounded length.
fn validate_name(name: &str) -> Result<String, CoordinatorError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CoordinatorError::InvalidDisplayName(format!(
            "display name must have 1..={MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}
