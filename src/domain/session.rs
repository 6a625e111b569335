//! Session record and lifecycle state machine.
//!
//! A session moves `Waiting → Selecting → Complete`, with `Complete →
//! Selecting` on restart and any live state `→ Expired` when its TTL
//! lapses or an administrator deletes it. `Expired` is terminal.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created; participants are joining.
    Waiting,
    /// Participants are privately picking options.
    Selecting,
    /// Every member has submitted; results are available.
    Complete,
    /// Terminal. Reached by TTL lapse or administrative deletion.
    Expired,
}

impl SessionState {
    /// Returns `true` if `next` is reachable from `self` in one step.
    ///
    /// `Waiting → Selecting` is driven by clients and not enforced
    /// centrally; it is still the only legal exit from `Waiting` besides
    /// expiry.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Selecting)
                | (Self::Selecting, Self::Complete)
                | (Self::Complete, Self::Selecting)
                | (Self::Waiting | Self::Selecting | Self::Complete, Self::Expired)
        )
    }

    /// Returns the state as its wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Selecting => "selecting",
            Self::Complete => "complete",
            Self::Expired => "expired",
        }
    }

    /// Parses a state from its wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "selecting" => Some(Self::Selecting),
            "complete" => Some(Self::Complete),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional geo-search parameters captured at session creation.
///
/// Opaque to the coordinator; place search happens outside this service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoParams {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Search radius in meters.
    pub radius_m: u32,
}

/// Canonical session record stored in the session hash.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Lifecycle state.
    pub state: SessionState,
    /// Number of current members. Kept equal to the membership set's
    /// cardinality by mutating both together.
    pub participant_count: u32,
    /// Creation timestamp (immutable after creation).
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent externally visible activity.
    pub last_activity_at: DateTime<Utc>,
    /// Display name of the session creator, for labeling only. Host
    /// *status* is claimed atomically by the first realtime joiner.
    pub host_name: Option<String>,
    /// Optional geo-search parameters.
    pub geo: Option<GeoParams>,
}

impl SessionRecord {
    /// Creates a fresh record in the `Waiting` state with no members.
    #[must_use]
    pub fn new(host_name: Option<String>, geo: Option<GeoParams>) -> Self {
        let now = Utc::now();
        Self {
            state: SessionState::Waiting,
            participant_count: 0,
            created_at: now,
            last_activity_at: now,
            host_name,
            geo,
        }
    }

    /// Flattens the record into store hash fields.
    #[must_use]
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("state".to_string(), self.state.as_str().to_string()),
            (
                "participant_count".to_string(),
                self.participant_count.to_string(),
            ),
            ("created_at".to_string(), self.created_at.to_rfc3339()),
            (
                "last_activity_at".to_string(),
                self.last_activity_at.to_rfc3339(),
            ),
        ];
        if let Some(name) = &self.host_name {
            fields.push(("host_name".to_string(), name.clone()));
        }
        if let Some(geo) = &self.geo {
            fields.push(("latitude".to_string(), geo.latitude.to_string()));
            fields.push(("longitude".to_string(), geo.longitude.to_string()));
            fields.push(("radius_m".to_string(), geo.radius_m.to_string()));
        }
        fields
    }

    /// Rebuilds a record from store hash fields.
    ///
    /// Returns `None` if any required field is missing or malformed —
    /// callers treat that the same as an absent record.
    #[must_use]
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let state = SessionState::parse(fields.get("state")?)?;
        let participant_count = fields.get("participant_count")?.parse().ok()?;
        let created_at = DateTime::parse_from_rfc3339(fields.get("created_at")?)
            .ok()?
            .with_timezone(&Utc);
        let last_activity_at = DateTime::parse_from_rfc3339(fields.get("last_activity_at")?)
            .ok()?
            .with_timezone(&Utc);
        let host_name = fields.get("host_name").cloned();
        let geo = match (
            fields.get("latitude"),
            fields.get("longitude"),
            fields.get("radius_m"),
        ) {
            (Some(lat), Some(lon), Some(r)) => Some(GeoParams {
                latitude: lat.parse().ok()?,
                longitude: lon.parse().ok()?,
                radius_m: r.parse().ok()?,
            }),
            _ => None,
        };
        Some(Self {
            state,
            participant_count,
            created_at,
            last_activity_at,
            host_name,
            geo,
        })
    }
}
