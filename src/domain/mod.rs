//! Domain layer: core types, session state machine, and event system.
//!
//! This module contains the server-side domain model including session
//! and participant identity, the session lifecycle state machine, the
//! candidate option catalog types, the closed set of broadcast events,
//! and the per-session room bus.

pub mod menu;
pub mod participant;
pub mod participant_id;
pub mod room_bus;
pub mod session;
pub mod session_code;
pub mod session_event;

pub use menu::{CandidateOption, OptionId};
pub use participant::Participant;
pub use participant_id::ParticipantId;
pub use room_bus::RoomBus;
pub use session::{GeoParams, SessionRecord, SessionState};
pub use session_code::SessionCode;
pub use session_event::{Audience, Envelope, SessionEvent};
