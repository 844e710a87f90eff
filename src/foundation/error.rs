/// Convenience result alias used across the crate.
pub type ImprintResult<T> = Result<T, ImprintError>;

/// Crate-wide error type.
///
/// Every variant carries a plain message and the enum is `Clone`: the session
/// manager fans the lazy-creation result out to all concurrent waiters
/// through a shared future, and a shared future's output must be cloneable.
#[derive(thiserror::Error, Clone, Debug)]
pub enum ImprintError {
    /// Malformed or missing required input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A codec call was given a non-positive or non-finite surface width.
    #[error("invalid surface: {0}")]
    InvalidSurface(String),

    /// A codec call was given a non-positive or non-finite scale.
    #[error("invalid scale: {0}")]
    InvalidScale(String),

    /// The order session already holds the maximum number of items.
    #[error("session full: {0}")]
    SessionFull(String),

    /// A remote call failed in transit. Transient; callers may retry once.
    #[error("network error: {0}")]
    Network(String),

    /// A durable read or write failed. Transient; callers may retry once.
    #[error("storage error: {0}")]
    Storage(String),

    /// A composition lookup missed. Ambiguous between truly absent and not
    /// yet durable; see `CompositionStore::get_eventually`.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend rejected locally-held session state. The only remedy is a
    /// cleared session.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// A record or mirror payload failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl ImprintError {
    /// Build a [`ImprintError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ImprintError::InvalidSurface`].
    pub fn invalid_surface(msg: impl Into<String>) -> Self {
        Self::InvalidSurface(msg.into())
    }

    /// Build a [`ImprintError::InvalidScale`].
    pub fn invalid_scale(msg: impl Into<String>) -> Self {
        Self::InvalidScale(msg.into())
    }

    /// Build a [`ImprintError::SessionFull`].
    pub fn session_full(msg: impl Into<String>) -> Self {
        Self::SessionFull(msg.into())
    }

    /// Build a [`ImprintError::Network`].
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Build a [`ImprintError::Storage`].
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Build a [`ImprintError::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`ImprintError::Consistency`].
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Build a [`ImprintError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for lookup misses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// `true` for failures a caller may reasonably retry once.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Storage(_))
    }
}
