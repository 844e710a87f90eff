//! Conversion between pixel-space placements and resolution-independent
//! normalized transforms.

/// The codec itself plus the placement helpers built on it.
pub mod codec;
