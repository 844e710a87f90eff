use std::io::Cursor;

use kurbo::{Affine, Point};

use crate::foundation::error::{ImprintError, ImprintResult};
use crate::surface::composite::{multiply, over, premultiply_rgba8_in_place, unpremultiply_rgba8_in_place};
use crate::surface::contract::{ObjectId, PlacementListener, Raster, RenderSurface};
use crate::transform::codec::{self, BlendMode, PixelPlacement, SurfaceSize};

/// Decode an encoded image (PNG, JPEG, …) into a straight-alpha [`Raster`].
pub fn decode_rgba(bytes: &[u8]) -> ImprintResult<Raster> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| ImprintError::validation(format!("decode image: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Raster {
        width,
        height,
        data: rgba.into_raw(),
        premultiplied: false,
    })
}

/// Encode a raster as PNG bytes (straight alpha on the wire).
pub fn encode_png(raster: &Raster) -> ImprintResult<Vec<u8>> {
    let mut data = raster.data.clone();
    if raster.premultiplied {
        unpremultiply_rgba8_in_place(&mut data);
    }
    let img = image::RgbaImage::from_raw(raster.width, raster.height, data)
        .ok_or_else(|| ImprintError::validation("raster buffer must be width * height * 4 bytes"))?;

    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ImprintError::storage(format!("encode png: {e}")))?;
    Ok(buf)
}

struct Sprite {
    width: u32,
    height: u32,
    premul: Vec<u8>,
}

impl Sprite {
    fn from_raster(image: Raster) -> Sprite {
        let mut premul = image.data;
        if !image.premultiplied {
            premultiply_rgba8_in_place(&mut premul);
        }
        Sprite {
            width: image.width,
            height: image.height,
            premul,
        }
    }
}

struct SpriteObject {
    sprite: Sprite,
    placement: PixelPlacement,
}

/// CPU raster production adapter.
///
/// Seats a contain-fitted product photo under any number of logo objects and
/// composites the scene in premultiplied RGBA8 with nearest sampling under
/// each object's affine placement. This is the adapter the share viewer and
/// artifact pipeline run on; an interactive canvas adapter satisfies the same
/// [`RenderSurface`] contract.
pub struct RasterSurface {
    size: SurfaceSize,
    clear_rgba: [u8; 4],
    background: Option<Sprite>,
    objects: Vec<(u64, SpriteObject)>,
    next: u64,
    listeners: Vec<PlacementListener>,
}

impl RasterSurface {
    /// Create a surface of the given pixel size with the editor's neutral
    /// backdrop color.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: SurfaceSize { width, height },
            clear_rgba: [0xf8, 0xf8, 0xf8, 0xff],
            background: None,
            objects: Vec::new(),
            next: 1,
            listeners: Vec::new(),
        }
    }

    /// Seat the product photo. It is contain-fitted and centered at
    /// rasterization time; it is not a placeable object.
    pub fn set_background(&mut self, image: Raster) {
        self.background = Some(Sprite::from_raster(image));
    }

    fn object(&self, id: ObjectId) -> ImprintResult<&SpriteObject> {
        self.objects
            .iter()
            .find(|(raw, _)| *raw == id.get())
            .map(|(_, obj)| obj)
            .ok_or_else(|| ImprintError::validation(format!("unknown surface object {id}")))
    }
}

impl RenderSurface for RasterSurface {
    fn add_image(&mut self, image: Raster) -> ImprintResult<ObjectId> {
        let placement =
            codec::initial_placement(f64::from(self.size.width), f64::from(image.width))?;
        let id = self.next;
        self.next += 1;
        self.objects.push((
            id,
            SpriteObject {
                sprite: Sprite::from_raster(image),
                placement,
            },
        ));
        Ok(ObjectId::new(id))
    }

    fn remove_object(&mut self, id: ObjectId) -> ImprintResult<()> {
        let before = self.objects.len();
        self.objects.retain(|(raw, _)| *raw != id.get());
        if self.objects.len() == before {
            return Err(ImprintError::validation(format!(
                "unknown surface object {id}"
            )));
        }
        Ok(())
    }

    fn placement(&self, id: ObjectId) -> ImprintResult<PixelPlacement> {
        Ok(self.object(id)?.placement)
    }

    fn set_placement(&mut self, id: ObjectId, placement: PixelPlacement) -> ImprintResult<()> {
        if placement.scale_x <= 0.0 || placement.scale_y <= 0.0 {
            return Err(ImprintError::invalid_scale("placement scales must be > 0"));
        }
        let obj = self
            .objects
            .iter_mut()
            .find(|(raw, _)| *raw == id.get())
            .map(|(_, obj)| obj)
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
        let obj = self.object(id)?;
        Ok((obj.sprite.width, obj.sprite.height))
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn rasterize(&self) -> ImprintResult<Raster> {
        let px = self.size.width as usize * self.size.height as usize;
        let mut data = Vec::with_capacity(px * 4);
        for _ in 0..px {
            data.extend_from_slice(&self.clear_rgba);
        }

        if let Some(bg) = &self.background {
            let (scale, left, top) = codec::fit_contain(self.size, bg.width, bg.height);
            let placement = PixelPlacement {
                x: left + f64::from(bg.width) * scale / 2.0,
                y: top + f64::from(bg.height) * scale / 2.0,
                scale_x: scale,
                scale_y: scale,
                rotation_deg: 0.0,
                opacity: 1.0,
                blend: BlendMode::Normal,
            };
            draw_sprite(&mut data, self.size, bg, &placement);
        }

        for (_, obj) in &self.objects {
            draw_sprite(&mut data, self.size, &obj.sprite, &obj.placement);
        }

        Ok(Raster {
            width: self.size.width,
            height: self.size.height,
            data,
            premultiplied: true,
        })
    }

    fn on_placement_changed(&mut self, listener: PlacementListener) {
        self.listeners.push(listener);
    }
}

fn draw_sprite(canvas: &mut [u8], size: SurfaceSize, sprite: &Sprite, p: &PixelPlacement) {
    let nw = f64::from(sprite.width);
    let nh = f64::from(sprite.height);
    if nw <= 0.0 || nh <= 0.0 {
        return;
    }

    let affine = Affine::translate((p.x, p.y))
        * Affine::rotate(p.rotation_deg.to_radians())
        * Affine::scale_non_uniform(p.scale_x, p.scale_y)
        * Affine::translate((-nw / 2.0, -nh / 2.0));
    let inv = affine.inverse();

    let corners = [
        affine * Point::new(0.0, 0.0),
        affine * Point::new(nw, 0.0),
        affine * Point::new(0.0, nh),
        affine * Point::new(nw, nh),
    ];
    let min_x = corners.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|c| c.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = corners.iter().map(|c| c.y).fold(f64::INFINITY, f64::min);
    let max_y = corners.iter().map(|c| c.y).fold(f64::NEG_INFINITY, f64::max);

    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().min(f64::from(size.width))).max(0.0) as u32;
    let y1 = (max_y.ceil().min(f64::from(size.height))).max(0.0) as u32;

    let opacity = p.opacity as f32;
    for y in y0..y1 {
        for x in x0..x1 {
            let src = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            if src.x < 0.0 || src.y < 0.0 || src.x >= nw || src.y >= nh {
                continue;
            }
            let si = ((src.y as usize) * sprite.width as usize + src.x as usize) * 4;
            let s = [
                sprite.premul[si],
                sprite.premul[si + 1],
                sprite.premul[si + 2],
                sprite.premul[si + 3],
            ];

            let di = ((y as usize) * size.width as usize + x as usize) * 4;
            let d = [canvas[di], canvas[di + 1], canvas[di + 2], canvas[di + 3]];
            let out = match p.blend {
                BlendMode::Normal => over(d, s, opacity),
                BlendMode::Multiply => multiply(d, s, opacity),
            };
            canvas[di..di + 4].copy_from_slice(&out);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/raster.rs"]
mod tests;
