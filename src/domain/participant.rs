//! Participant record stored per session member.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ParticipantId;

/// A member of a session.
///
/// Membership survives disconnects: only an intentional leave or session
/// teardown removes the record. Presence (online/offline) is tracked
/// separately and never gates game logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    /// Connection-scoped identity.
    pub id: ParticipantId,
    /// Display name shown to other members.
    pub display_name: String,
    /// Join timestamp.
    pub joined_at: DateTime<Utc>,
    /// Whether this member has submitted their selections this round.
    pub has_submitted: bool,
    /// Whether this member holds the host slot. Assigned to the first
    /// joiner and never reassigned on disconnect.
    pub is_host: bool,
}

impl Participant {
    /// Creates a fresh member record.
    #[must_use]
    pub fn new(id: ParticipantId, display_name: String, is_host: bool) -> Self {
        Self {
            id,
            display_name,
            joined_at: Utc::now(),
            has_submitted: false,
            is_host,
        }
    }

    /// Flattens the record into store hash fields.
    #[must_use]
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("display_name".to_string(), self.display_name.clone()),
            ("joined_at".to_string(), self.joined_at.to_rfc3339()),
            (
                "has_submitted".to_string(),
                if self.has_submitted { "1" } else { "0" }.to_string(),
            ),
            (
                "is_host".to_string(),
                if self.is_host { "1" } else { "0" }.to_string(),
            ),
        ]
    }

    /// Rebuilds a record from store hash fields.
    ///
    /// Returns `None` when required fields are missing or malformed.
    #[must_use]
    pub fn from_fields(id: ParticipantId, fields: &HashMap<String, String>) -> Option<Self> {
        let display_name = fields.get("display_name")?.clone();
        let joined_at = DateTime::parse_from_rfc3339(fields.get("joined_at")?)
            .ok()?
            .with_timezone(&Utc);
        let has_submitted = fields.get("has_submitted").map(String::as_str) == Some("1");
        let is_host = fields.get("is_host").map(String::as_str) == Some("1");
        Some(Self {
            id,
            display_name,
            joined_at,
            has_submitted,
            is_host,
        })
    }
}
