use serde::{Deserialize, Serialize};

use crate::foundation::error::{ImprintError, ImprintResult};

/// How a logo object is blended over the product photo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Straight source-over compositing.
    #[default]
    Normal,
    /// Multiply, which keeps white effectively transparent on light garments.
    Multiply,
}

/// Pixel dimensions of a rendering surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// An object placement in the pixel space of one particular surface.
///
/// `x`/`y` locate the object's **center**. `scale_x`/`scale_y` are the factors
/// applied to the source image's natural pixel size, so a 400px-wide logo with
/// `scale_x = 0.5` renders 200px wide.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelPlacement {
    /// Center x in surface pixels.
    pub x: f64,
    /// Center y in surface pixels.
    pub y: f64,
    /// Horizontal scale factor over the natural width.
    pub scale_x: f64,
    /// Vertical scale factor over the natural height.
    pub scale_y: f64,
    /// Clockwise rotation in degrees.
    pub rotation_deg: f64,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Blend mode.
    pub blend: BlendMode,
}

/// A resolution-independent placement, replayable on any surface size.
///
/// `x` and `y` are fractions of the surface **width** — width is the divisor
/// for both axes. This is deliberate: replaying a placement on a surface with
/// a different aspect ratio then preserves the placement's visual position and
/// size relative to the product photo's width instead of shearing it against
/// two independent axes. `scale_x`/`scale_y` are the rendered size as a
/// fraction of surface width.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransform {
    /// Center x as a fraction of surface width.
    pub x: f64,
    /// Center y as a fraction of surface width.
    pub y: f64,
    /// Rendered width as a fraction of surface width.
    pub scale_x: f64,
    /// Rendered height (over natural height) as a fraction of surface width.
    pub scale_y: f64,
    /// Clockwise rotation in degrees, carried through unchanged.
    pub rotation_deg: f64,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Blend mode, carried through unchanged.
    pub blend: BlendMode,
}

impl NormalizedTransform {
    /// Validate a transform parsed from an untrusted document.
    pub fn validate(&self) -> ImprintResult<()> {
        for (name, v) in [
            ("x", self.x),
            ("y", self.y),
            ("rotation_deg", self.rotation_deg),
        ] {
            if !v.is_finite() {
                return Err(ImprintError::validation(format!(
                    "transform {name} must be finite"
                )));
            }
        }
        for (name, v) in [("scale_x", self.scale_x), ("scale_y", self.scale_y)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(ImprintError::invalid_scale(format!(
                    "transform {name} must be finite and > 0"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ImprintError::validation(
                "transform opacity must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

fn checked_width(surface_width: f64) -> ImprintResult<f64> {
    if !surface_width.is_finite() || surface_width <= 0.0 {
        return Err(ImprintError::invalid_surface(
            "surface width must be finite and > 0",
        ));
    }
    Ok(surface_width)
}

fn checked_natural_width(natural_width: f64) -> ImprintResult<f64> {
    if !natural_width.is_finite() || natural_width <= 0.0 {
        return Err(ImprintError::invalid_scale(
            "source natural width must be finite and > 0",
        ));
    }
    Ok(natural_width)
}

/// Convert a pixel-space placement into a resolution-independent transform.
///
/// `surface.height` participates in the signature for symmetry with the
/// adapter contract but not in the math: both axes divide by width, by
/// design. Opacity is clamped into `[0, 1]`.
pub fn normalize(
    placement: &PixelPlacement,
    surface: SurfaceSize,
    natural_width: f64,
) -> ImprintResult<NormalizedTransform> {
    let w = checked_width(f64::from(surface.width))?;
    let nw = checked_natural_width(natural_width)?;

    for (name, v) in [("scale_x", placement.scale_x), ("scale_y", placement.scale_y)] {
        if !v.is_finite() || v <= 0.0 {
            return Err(ImprintError::invalid_scale(format!(
                "pixel {name} must be finite and > 0"
            )));
        }
    }

    Ok(NormalizedTransform {
        x: placement.x / w,
        y: placement.y / w,
        scale_x: placement.scale_x * nw / w,
        scale_y: placement.scale_y * nw / w,
        rotation_deg: placement.rotation_deg,
        opacity: placement.opacity.clamp(0.0, 1.0),
        blend: placement.blend,
    })
}

/// Convert a normalized transform back into pixel space for a surface of the
/// given width. The exact inverse of [`normalize`].
pub fn denormalize(
    transform: &NormalizedTransform,
    surface_width: f64,
    natural_width: f64,
) -> ImprintResult<PixelPlacement> {
    let w = checked_width(surface_width)?;
    let nw = checked_natural_width(natural_width)?;

    for (name, v) in [("scale_x", transform.scale_x), ("scale_y", transform.scale_y)] {
        if !v.is_finite() || v <= 0.0 {
            return Err(ImprintError::invalid_scale(format!(
                "normalized {name} must be finite and > 0"
            )));
        }
    }

    Ok(PixelPlacement {
        x: transform.x * w,
        y: transform.y * w,
        scale_x: transform.scale_x * w / nw,
        scale_y: transform.scale_y * w / nw,
        rotation_deg: transform.rotation_deg,
        opacity: transform.opacity.clamp(0.0, 1.0),
        blend: transform.blend,
    })
}

/// Default placement for a freshly dropped logo: centered at
/// `(width / 2, width / 2)` (width for both axes, matching the normalized
/// space) and rendered at 40% of the surface width.
pub fn initial_placement(surface_width: f64, natural_width: f64) -> ImprintResult<PixelPlacement> {
    let w = checked_width(surface_width)?;
    let nw = checked_natural_width(natural_width)?;
    let scale = (w * 0.4) / nw;
    Ok(PixelPlacement {
        x: w / 2.0,
        y: w / 2.0,
        scale_x: scale,
        scale_y: scale,
        rotation_deg: 0.0,
        opacity: 1.0,
        blend: BlendMode::Normal,
    })
}

/// Uniform contain-fit of an image inside a surface: the largest scale at
/// which the whole image stays visible, plus the top-left offsets that center
/// it. Used to seat the product photo.
pub fn fit_contain(surface: SurfaceSize, image_width: u32, image_height: u32) -> (f64, f64, f64) {
    let cw = f64::from(surface.width);
    let ch = f64::from(surface.height);
    let iw = f64::from(image_width.max(1));
    let ih = f64::from(image_height.max(1));

    let scale = (cw / iw).min(ch / ih);
    let left = (cw - iw * scale) / 2.0;
    let top = (ch - ih * scale) / 2.0;
    (scale, left, top)
}
