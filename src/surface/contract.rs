use crate::foundation::error::{ImprintError, ImprintResult};
use crate::transform::codec::{PixelPlacement, SurfaceSize};

/// Handle of an image object placed on a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Wrap a raw handle value. Adapters mint these; the core only passes
    /// them back.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raster as RGBA8 pixels.
///
/// The `premultiplied` flag makes alpha handling explicit at API boundaries:
/// decoded inputs are straight alpha, composited outputs are premultiplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl Raster {
    /// Build a straight-alpha raster, validating the buffer length.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> ImprintResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4));
        if expected != Some(data.len()) {
            return Err(ImprintError::validation(
                "raster buffer must be width * height * 4 bytes",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
            premultiplied: false,
        })
    }

    /// A solid-color straight-alpha raster.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
            premultiplied: false,
        }
    }
}

/// Callback invoked after an object's placement changed.
pub type PlacementListener = Box<dyn FnMut(ObjectId) + Send>;

/// The capability contract the core consumes.
///
/// Implementations own whatever scene-graph or canvas they wrap; the core
/// only ever exchanges [`PixelPlacement`] numbers and raw rasters with them.
/// Positions are object-center origin.
pub trait RenderSurface {
    /// Add an image object and seat it at the default drop placement
    /// (centered, rendered at 40% of the surface width).
    fn add_image(&mut self, image: Raster) -> ImprintResult<ObjectId>;

    /// Remove an object. Unknown handles are a validation error.
    fn remove_object(&mut self, id: ObjectId) -> ImprintResult<()>;

    /// Current placement of an object.
    fn placement(&self, id: ObjectId) -> ImprintResult<PixelPlacement>;

    /// Move/scale/rotate an object. Scales must stay positive; opacity is
    /// clamped. Notifies placement listeners on success.
    fn set_placement(&mut self, id: ObjectId, placement: PixelPlacement) -> ImprintResult<()>;

    /// Natural (source) pixel size of an object's image.
    fn natural_size(&self, id: ObjectId) -> ImprintResult<(u32, u32)>;

    /// Surface pixel dimensions.
    fn size(&self) -> SurfaceSize;

    /// Rasterize the current surface contents.
    fn rasterize(&self) -> ImprintResult<Raster>;

    /// Subscribe to placement-change notifications.
    fn on_placement_changed(&mut self, listener: PlacementListener);
}
