//! Domain events broadcast to session rooms.
//!
//! Every externally visible state change emits a [`SessionEvent`] through
//! the [`super::RoomBus`]. The set is closed and each variant has fixed
//! fields; the WebSocket layer serializes variants directly and never
//! assembles ad hoc payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::menu::CandidateOption;
use super::{ParticipantId, SessionCode};

/// Delivery audience for a broadcast envelope.
///
/// The room bus fans every envelope out to all connections subscribed to
/// the session's room; each connection applies this filter before
/// writing to its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Exactly one participant's connection.
    Participant(ParticipantId),
    /// Every room member except the named participant (typically the
    /// sender of the action, who gets a direct acknowledgment instead).
    RoomExcept(ParticipantId),
    /// Every room member.
    Room,
}

impl Audience {
    /// Returns `true` if a connection owned by `id` should deliver an
    /// envelope with this audience.
    #[must_use]
    pub fn includes(&self, id: ParticipantId) -> bool {
        match self {
            Self::Participant(target) => *target == id,
            Self::RoomExcept(excluded) => *excluded != id,
            Self::Room => true,
        }
    }
}

/// An audience-tagged event as carried on a session room channel.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Who should receive the event.
    pub audience: Audience,
    /// The event itself.
    pub event: SessionEvent,
}

/// Domain event emitted after a state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum SessionEvent {
    /// A participant joined the session.
    #[serde(rename = "participant:joined")]
    ParticipantJoined {
        /// Session code.
        code: SessionCode,
        /// The joiner's id.
        participant_id: ParticipantId,
        /// The joiner's display name.
        display_name: String,
        /// Member count after the join.
        participant_count: u32,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A participant submitted their selections. Counts only — contents
    /// stay private until the round completes.
    #[serde(rename = "participant:submitted")]
    ParticipantSubmitted {
        /// Session code.
        code: SessionCode,
        /// Members who have submitted so far.
        submitted_count: u32,
        /// Total member count.
        participant_count: u32,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The round completed; the agreement set is revealed.
    #[serde(rename = "session:results")]
    SessionResults {
        /// Session code.
        code: SessionCode,
        /// Options every member picked. Empty when there is no overlap.
        overlapping: Vec<CandidateOption>,
        /// Every member's full selection, keyed by display name.
        all_selections: HashMap<String, Vec<CandidateOption>>,
        /// Whether the intersection is non-empty.
        has_overlap: bool,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The session was reset for a new round.
    #[serde(rename = "session:restarted")]
    SessionRestarted {
        /// Session code.
        code: SessionCode,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A participant left (intentionally) or disconnected. On disconnect
    /// the count is unchanged — membership survives connectivity loss.
    #[serde(rename = "participant:left")]
    ParticipantLeft {
        /// Session code.
        code: SessionCode,
        /// The leaver's id.
        participant_id: ParticipantId,
        /// The leaver's display name.
        display_name: String,
        /// Member count after the action.
        participant_count: u32,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The session's TTL lapsed.
    #[serde(rename = "session:expired")]
    SessionExpired {
        /// Session code.
        code: SessionCode,
        /// Why the session expired (currently always `"inactivity"`).
        reason: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Returns the session code associated with this event.
    #[must_use]
    pub fn code(&self) -> &SessionCode {
        match self {
            Self::ParticipantJoined { code, .. }
            | Self::ParticipantSubmitted { code, .. }
            | Self::SessionResults { code, .. }
            | Self::SessionRestarted { code, .. }
            | Self::ParticipantLeft { code, .. }
            | Self::SessionExpired { code, .. } => code,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant:joined",
            Self::ParticipantSubmitted { .. } => "participant:submitted",
            Self::SessionResults { .. } => "session:results",
            Self::SessionRestarted { .. } => "session:restarted",
            Self::ParticipantLeft { .. } => "participant:left",
            Self::SessionExpired { .. } => "session:expired",
        }
    }
}
