//! Imprint is the placement-and-ordering core of a product mockup editor.
//!
//! A shopper drops a logo onto a photo of a catalog product, previews the
//! result, and either shares the placement as an immutable composition record
//! or collects up to five placements into a bounded order session. The public
//! API is built around four pieces:
//!
//! - [`transform`] — a pure codec between pixel-space placements and
//!   resolution-independent [`NormalizedTransform`]s
//! - [`composition`] — create/fetch immutable [`CompositionRecord`]s behind a
//!   pluggable [`DocumentStore`]
//! - [`session`] — the [`SessionManager`] state machine with a durable local
//!   mirror for reload survival
//! - [`surface`] — the [`RenderSurface`] capability the editor UI drives,
//!   with one CPU raster adapter and one deterministic fake
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backend;
pub mod composition;
mod foundation;
pub mod session;
pub mod surface;
pub mod transform;

pub use crate::foundation::error::{ImprintError, ImprintResult};
pub use crate::foundation::ids::{CompositionId, ItemId, MAX_SLOTS, SessionId, SlotIndex};

pub use crate::backend::contract::{AddItemRequest, SessionBackend};
pub use crate::backend::memory::{BackendOp, InMemoryBackend};
pub use crate::composition::record::{CompositionDraft, CompositionRecord};
pub use crate::composition::store::{
    CompositionStore, DocumentStore, FsDocumentStore, MemoryDocumentStore,
};
pub use crate::session::manager::{SessionManager, SessionManagerOpts};
pub use crate::session::mirror::{DurableStore, FileStore, MemoryStore, ORDER_MIRROR_KEY};
pub use crate::session::model::{
    FinalizeMetadata, OrderItem, OrderItemDraft, OrderSession, PrintMethod, ProductRef,
    SessionPhase, Variant,
};
pub use crate::surface::contract::{ObjectId, PlacementListener, Raster, RenderSurface};
pub use crate::surface::fake::FakeSurface;
pub use crate::surface::raster::{RasterSurface, decode_rgba, encode_png};
pub use crate::transform::codec::{
    BlendMode, NormalizedTransform, PixelPlacement, SurfaceSize, denormalize, fit_contain,
    initial_placement, normalize,
};
