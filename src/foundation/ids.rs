use serde::{Deserialize, Serialize};

use crate::foundation::error::{ImprintError, ImprintResult};

/// Number of cart positions in an order session.
pub const MAX_SLOTS: u8 = 5;

/// Short identifier of a persisted composition record.
///
/// Eight hex characters drawn from a UUIDv4, never a sequential counter, so
/// ids cannot be enumerated and concurrent creations do not collide in
/// practice.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionId(String);

impl CompositionId {
    /// Generate a fresh id from a high-entropy random source.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(hex[..8].to_owned())
    }

    /// Wrap an existing id string (e.g. parsed from a share URL).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CompositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote identifier of an order session, issued by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a backend-issued id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local identifier of an order item (UUIDv4).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a fresh item id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One of the five fixed cart positions, `1..=5`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotIndex(u8);

impl SlotIndex {
    /// Build a validated slot index.
    pub fn new(slot: u8) -> ImprintResult<Self> {
        if slot == 0 || slot > MAX_SLOTS {
            return Err(ImprintError::validation(format!(
                "slot index must be in 1..={MAX_SLOTS}, got {slot}"
            )));
        }
        Ok(Self(slot))
    }

    /// The raw 1-based index.
    pub fn get(self) -> u8 {
        self.0
    }

    /// All slot indices in ascending order.
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (1..=MAX_SLOTS).map(SlotIndex)
    }
}

impl TryFrom<u8> for SlotIndex {
    type Error = ImprintError;

    fn try_from(slot: u8) -> ImprintResult<Self> {
        Self::new(slot)
    }
}

impl From<SlotIndex> for u8 {
    fn from(slot: SlotIndex) -> u8 {
        slot.0
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
