use serde::{Deserialize, Serialize};

use crate::foundation::error::{ImprintError, ImprintResult};
use crate::foundation::ids::CompositionId;
use crate::surface::contract::{ObjectId, RenderSurface};
use crate::transform::codec::{self, NormalizedTransform};

/// Payload for creating a composition record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionDraft {
    /// The catalog product the placement was made on.
    pub product_ref: String,
    /// The resolution-independent placement.
    pub transform: NormalizedTransform,
    /// Which of the product's photos the placement targets.
    #[serde(default)]
    pub source_image_index: usize,
    /// Reference to the logo image (upload ref or data ref).
    pub logo_ref: String,
}

impl CompositionDraft {
    /// Validate required fields before persistence.
    pub fn validate(&self) -> ImprintResult<()> {
        if self.product_ref.trim().is_empty() {
            return Err(ImprintError::validation(
                "composition product_ref must be non-empty",
            ));
        }
        self.transform.validate()
    }

    /// Capture a draft straight off a live surface: read the object's pixel
    /// placement and normalize it against the surface's current size.
    pub fn from_surface<S: RenderSurface + ?Sized>(
        surface: &S,
        object: ObjectId,
        product_ref: impl Into<String>,
        source_image_index: usize,
        logo_ref: impl Into<String>,
    ) -> ImprintResult<Self> {
        let placement = surface.placement(object)?;
        let (natural_width, _) = surface.natural_size(object)?;
        let transform = codec::normalize(&placement, surface.size(), f64::from(natural_width))?;
        Ok(Self {
            product_ref: product_ref.into(),
            transform,
            source_image_index,
            logo_ref: logo_ref.into(),
        })
    }
}

/// A persisted composition. Immutable after creation: there is no update or
/// delete, and records do not expire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    /// Short shareable id.
    pub id: CompositionId,
    /// Server-side creation stamp, epoch milliseconds.
    pub created_at_ms: u64,
    /// The catalog product the placement was made on.
    pub product_ref: String,
    /// The resolution-independent placement.
    pub transform: NormalizedTransform,
    /// Which of the product's photos the placement targets.
    #[serde(default)]
    pub source_image_index: usize,
    /// Reference to the logo image.
    pub logo_ref: String,
}
