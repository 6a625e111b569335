//! Session-related DTOs for create and get operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{CandidateOption, GeoParams, OptionId};

/// Geo-search parameters as provided in session creation requests.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GeoParamsDto {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Search radius in meters.
    pub radius_m: u32,
}

impl From<GeoParamsDto> for GeoParams {
    fn from(dto: GeoParamsDto) -> Self {
        Self {
            latitude: dto.latitude,
            longitude: dto.longitude,
            radius_m: dto.radius_m,
        }
    }
}

/// One candidate option as provided in session creation requests. The
/// id comes from the upstream place search; the display fields are
/// cached in the catalog for result mapping.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CandidateOptionDto {
    /// Upstream option identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Optional rating.
    #[serde(default)]
    pub rating: Option<f32>,
}

impl From<CandidateOptionDto> for CandidateOption {
    fn from(dto: CandidateOptionDto) -> Self {
        Self {
            id: OptionId::new(dto.id),
            name: dto.name,
            address: dto.address,
            rating: dto.rating,
        }
    }
}

/// Request body for `POST /sessions`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    /// Display name of the creator (becomes the session's host label).
    pub host_name: String,
    /// Optional geo-search parameters, stored as session metadata.
    #[serde(default)]
    pub geo: Option<GeoParamsDto>,
    /// Candidate options members will pick from (1..=100).
    pub options: Vec<CandidateOptionDto>,
}

/// Response body for `POST /sessions` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    /// The 6-character session code to share with the group.
    pub code: String,
    /// Lifecycle state (always `waiting` at creation).
    pub state: String,
    /// Server creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Shared absolute expiry of the session's state.
    pub expires_at: Option<DateTime<Utc>>,
}
