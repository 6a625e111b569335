//! Type-safe participant identifier.
//!
//! [`ParticipantId`] is a newtype wrapper around [`uuid::Uuid`] (v4). It
//! identifies a *connection*, not a person: the same human reconnecting
//! receives a fresh id and rejoins as a new participant.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection-scoped identifier for a session participant.
///
/// Generated server-side when a WebSocket connection is accepted and
/// immutable for the life of that connection. Used as the member key in
/// the membership set, the selection-set key suffix, and the audience
/// discriminator for targeted broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(uuid::Uuid);

impl ParticipantId {
    /// Creates a new random `ParticipantId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `ParticipantId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a participant id from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<uuid::Uuid>().ok().map(Self)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
