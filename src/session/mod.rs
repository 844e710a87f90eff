//! The bounded order session: up to five placements, a lazily-created remote
//! session, and a durable local mirror that survives page reloads.

/// The state machine.
pub mod manager;
/// The durable mirror seam.
pub mod mirror;
/// Session data model.
pub mod model;
