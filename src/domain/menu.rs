//! Candidate option types.
//!
//! Options are produced by a place search outside this service and
//! supplied at session creation. The coordinator stores the per-session
//! candidate id set (on the session's expiry clock) and caches each
//! option's display record under an independent catalog TTL.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a dining option, as assigned by the upstream
/// place search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(String);

impl OptionId {
    /// Wraps a raw option id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display record of a candidate option, cached in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOption {
    /// Upstream option identifier.
    pub id: OptionId,
    /// Display name (e.g. restaurant name).
    pub name: String,
    /// Optional street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Optional rating on the upstream provider's scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

impl CandidateOption {
    /// Flattens the display record into catalog hash fields.
    #[must_use]
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("name".to_string(), self.name.clone())];
        if let Some(address) = &self.address {
            fields.push(("address".to_string(), address.clone()));
        }
        if let Some(rating) = self.rating {
            fields.push(("rating".to_string(), rating.to_string()));
        }
        fields
    }

    /// Rebuilds a display record from catalog hash fields.
    ///
    /// Returns `None` when the name is missing; other fields degrade
    /// gracefully.
    #[must_use]
    pub fn from_fields(id: OptionId, fields: &HashMap<String, String>) -> Option<Self> {
        let name = fields.get("name")?.clone();
        let address = fields.get("address").cloned();
        let rating = fields.get("rating").and_then(|r| r.parse().ok());
        Some(Self {
            id,
            name,
            address,
            rating,
        })
    }
}
