use std::collections::BTreeMap;

use crate::foundation::error::{ImprintError, ImprintResult};
use crate::surface::contract::{ObjectId, PlacementListener, Raster, RenderSurface};
use crate::transform::codec::{self, PixelPlacement, SurfaceSize};

struct FakeObject {
    natural: (u32, u32),
    placement: PixelPlacement,
}

/// Deterministic in-memory surface for tests.
///
/// Holds placements and natural sizes only; `rasterize` produces a stable
/// solid raster whose red channel encodes the object count, so artifact
/// plumbing stays assertable without real image decoding.
pub struct FakeSurface {
    size: SurfaceSize,
    objects: BTreeMap<u64, FakeObject>,
    next: u64,
    listeners: Vec<PlacementListener>,
}

impl FakeSurface {
    /// Create a fake surface of the given pixel size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: SurfaceSize { width, height },
            objects: BTreeMap::new(),
            next: 1,
            listeners: Vec::new(),
        }
    }

    /// Number of objects currently on the surface.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn object(&self, id: ObjectId) -> ImprintResult<&FakeObject> {
        self.objects
            .get(&id.get())
            .ok_or_else(|| ImprintError::validation(format!("unknown surface object {id}")))
    }
}

impl RenderSurface for FakeSurface {
    fn add_image(&mut self, image: Raster) -> ImprintResult<ObjectId> {
        let placement = codec::initial_placement(f64::from(self.size.width), f64::from(image.width))?;
        let id = self.next;
        self.next += 1;
        self.objects.insert(
            id,
            FakeObject {
                natural: (image.width, image.height),
                placement,
            },
        );
        Ok(ObjectId::new(id))
    }

    fn remove_object(&mut self, id: ObjectId) -> ImprintResult<()> {
        self.objects
            .remove(&id.get())
            .map(|_| ())
            .ok_or_else(|| ImprintError::validation(format!("unknown surface object {id}")))
    }

    fn placement(&self, id: ObjectId) -> ImprintResult<PixelPlacement> {
        Ok(self.object(id)?.placement)
    }

    fn set_placement(&mut self, id: ObjectId, placement: PixelPlacement) -> ImprintResult<()> {
        if placement.scale_x <= 0.0 || placement.scale_y <= 0.0 {
            return Err(ImprintError::invalid_scale(
                "placement scales must be > 0",
            ));
        }
        let obj = self
            .objects
            .get_mut(&id.get())
            .ok_or_else(|| ImprintError::validation(format!("unknown surface object {id}")))?;
        obj.placement = PixelPlacement {
            opacity: placement.opacity.clamp(0.0, 1.0),
            ..placement
        };
        for listener in &mut self.listeners {
            listener(id);
        }
        Ok(())
    }

    fn natural_size(&self, id: ObjectId) -> ImprintResult<(u32, u32)> {
        Ok(self.object(id)?.natural)
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn rasterize(&self) -> ImprintResult<Raster> {
        let marker = (self.objects.len() as u8).saturating_mul(40);
        Ok(Raster::solid(
            self.size.width,
            self.size.height,
            [marker, 128, 128, 255],
        ))
    }

    fn on_placement_changed(&mut self, listener: PlacementListener) {
        self.listeners.push(listener);
    }
}
