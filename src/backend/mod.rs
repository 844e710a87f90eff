//! The remote order backend contract and its in-memory test double.

/// Abstract backend contract for order sessions.
pub mod contract;
/// In-memory backend double with failure injection.
pub mod memory;
