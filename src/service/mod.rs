//! Service layer: session orchestration and its collaborating engines.
//!
//! [`coordinator::SessionService`] is the facade both transports call.
//! It composes the [`registry::SessionRegistry`] (records + state
//! machine), the [`membership::MembershipTracker`] (roster, host slot,
//! presence), the [`selections::SelectionStore`] (write-once picks +
//! overlap), and the [`expiry::ExpiryCoordinator`] (shared TTL clock),
//! serializing per-session critical sections via [`locks::SessionLocks`].

pub mod coordinator;
pub mod expiry;
pub mod locks;
pub mod membership;
pub mod registry;
pub mod selections;

pub use coordinator::{JoinOutcome, SessionService, SessionSnapshot, SubmitOutcome};
pub use expiry::ExpiryCoordinator;
pub use locks::SessionLocks;
pub use membership::MembershipTracker;
pub use registry::SessionRegistry;
pub use selections::{OverlapResult, SelectionStore};
