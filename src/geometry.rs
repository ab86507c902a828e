// ============================================================================
// GEOMETRY - display ↔ natural coordinate mapping, fitting, crop rectangles
// ============================================================================
//
// The background is shown scaled inside a display box while all pixel work
// happens at the image's natural resolution.  Everything here is a pure
// function over plain numbers.

use serde::{Deserialize, Serialize};

/// Uniform scale that fits `source` inside `max`, preserving aspect ratio.
///
/// `scale_to_fit(1000, 500, 300, 300)` is `0.3` (bound by width).
pub fn scale_to_fit(source_w: f32, source_h: f32, max_w: f32, max_h: f32) -> f32 {
    if source_w <= 0.0 || source_h <= 0.0 {
        return 0.0;
    }
    (max_w / source_w).min(max_h / source_h)
}

/// Integer box produced by applying `scale` to `(w, h)`; never smaller than 1×1.
pub fn fitted_size(source_w: u32, source_h: u32, scale: f32) -> (u32, u32) {
    let w = (source_w as f32 * scale).round().max(1.0) as u32;
    let h = (source_h as f32 * scale).round().max(1.0) as u32;
    (w, h)
}

/// Clamp a percentage into `[0, 100]`.  Editing controls call this; the
/// document model stores whatever it is given.
pub fn clamp_percent(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

/// Convert a `(left%, top%)` position into pixels inside a `w × h` box.
pub fn percent_to_pixels(left: f32, top: f32, w: u32, h: u32) -> (f32, f32) {
    (left / 100.0 * w as f32, top / 100.0 * h as f32)
}

/// Convert a pixel position inside a `w × h` box into `(left%, top%)`.
pub fn pixels_to_percent(x: f32, y: f32, w: u32, h: u32) -> (f32, f32) {
    if w == 0 || h == 0 {
        return (0.0, 0.0);
    }
    (x / w as f32 * 100.0, y / h as f32 * 100.0)
}

/// Per-axis factors mapping display pixels to natural pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors { x: 1.0, y: 1.0 };

    /// Factors for an image of `natural` size shown at `display` size.
    pub fn between(natural: (u32, u32), display: (u32, u32)) -> Self {
        if display.0 == 0 || display.1 == 0 {
            return Self::IDENTITY;
        }
        Self {
            x: natural.0 as f32 / display.0 as f32,
            y: natural.1 as f32 / display.1 as f32,
        }
    }

    pub fn display_to_natural(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.x, y * self.y)
    }

    pub fn natural_to_display(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = if self.x == 0.0 { 1.0 } else { self.x };
        let sy = if self.y == 0.0 { 1.0 } else { self.y };
        (x / sx, y / sy)
    }
}

/// Axis-aligned rectangle in pixel units (display or natural, by context).
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Multiply each dimension by the matching scale factor.
    pub fn scaled(&self, scale: ScaleFactors) -> PixelRect {
        PixelRect {
            x: self.x * scale.x,
            y: self.y * scale.y,
            width: self.width * scale.x,
            height: self.height * scale.y,
        }
    }

    /// Round to whole pixels and clamp inside a `w × h` image.
    /// Returns `(x, y, width, height)`; width/height may be 0.
    pub fn to_pixel_bounds(&self, w: u32, h: u32) -> (u32, u32, u32, u32) {
        let x0 = self.x.round().clamp(0.0, w as f32) as u32;
        let y0 = self.y.round().clamp(0.0, h as f32) as u32;
        let x1 = (self.x + self.width).round().clamp(0.0, w as f32) as u32;
        let y1 = (self.y + self.height).round().clamp(0.0, h as f32) as u32;
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    pub fn to_percent(&self, w: u32, h: u32) -> PercentRect {
        if w == 0 || h == 0 {
            return PercentRect::default();
        }
        PercentRect {
            x: self.x / w as f32 * 100.0,
            y: self.y / h as f32 * 100.0,
            width: self.width / w as f32 * 100.0,
            height: self.height / h as f32 * 100.0,
        }
    }
}

/// Rectangle in percent of the displayed image.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PercentRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PercentRect {
    pub fn to_pixels(&self, w: u32, h: u32) -> PixelRect {
        PixelRect {
            x: self.x / 100.0 * w as f32,
            y: self.y / 100.0 * h as f32,
            width: self.width / 100.0 * w as f32,
            height: self.height / 100.0 * h as f32,
        }
    }
}

/// Fraction of the limiting dimension an aspect crop starts out covering.
const ASPECT_CROP_COVERAGE: f32 = 0.9;

/// Largest centered rectangle of `aspect` (width / height) covering 90% of the
/// limiting dimension of a `w × h` image, expressed in percent.
pub fn aspect_centered_crop(aspect: f32, w: u32, h: u32) -> PercentRect {
    if w == 0 || h == 0 || aspect <= 0.0 {
        return PercentRect::default();
    }
    let (wf, hf) = (w as f32, h as f32);
    let mut crop_w = wf * ASPECT_CROP_COVERAGE;
    let mut crop_h = crop_w / aspect;
    if crop_h > hf * ASPECT_CROP_COVERAGE {
        crop_h = hf * ASPECT_CROP_COVERAGE;
        crop_w = crop_h * aspect;
    }
    let rect = PixelRect {
        x: (wf - crop_w) / 2.0,
        y: (hf - crop_h) / 2.0,
        width: crop_w,
        height: crop_h,
    };
    rect.to_percent(w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn scale_to_fit_bound_by_width() {
        let s = scale_to_fit(1000.0, 500.0, 300.0, 300.0);
        assert!(approx(s, 0.3));
        assert_eq!(fitted_size(1000, 500, s), (300, 150));
    }

    #[test]
    fn scale_to_fit_bound_by_height() {
        let s = scale_to_fit(400.0, 800.0, 426.0, 648.0);
        assert!(approx(s, 0.81));
    }

    #[test]
    fn display_to_natural_round_trip() {
        let f = ScaleFactors::between((2000, 1000), (500, 250));
        assert_eq!(f, ScaleFactors { x: 4.0, y: 4.0 });
        let (nx, ny) = f.display_to_natural(10.0, 20.0);
        assert_eq!((nx, ny), (40.0, 80.0));
        assert_eq!(f.natural_to_display(nx, ny), (10.0, 20.0));
    }

    #[test]
    fn zero_display_size_falls_back_to_identity() {
        assert_eq!(ScaleFactors::between((100, 100), (0, 50)), ScaleFactors::IDENTITY);
    }

    #[test]
    fn pixel_bounds_clamp_to_image() {
        let r = PixelRect::new(-5.0, 10.0, 200.0, 30.4);
        assert_eq!(r.to_pixel_bounds(100, 100), (0, 10, 100, 30));
    }

    #[test]
    fn aspect_crop_is_centered_and_keeps_ratio() {
        let pct = aspect_centered_crop(1.0, 1600, 900);
        let px = pct.to_pixels(1600, 900);
        assert!(approx(px.width, px.height));
        assert!(approx(px.height, 810.0));
        assert!(approx(px.x + px.width / 2.0, 800.0));
        assert!(approx(px.y + px.height / 2.0, 450.0));

        let wide = aspect_centered_crop(16.0 / 9.0, 1000, 1000).to_pixels(1000, 1000);
        assert!(approx(wide.width, 900.0));
        assert!(approx(wide.height, 506.25));
    }

    #[test]
    fn clamp_percent_limits_range() {
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(140.0), 100.0);
        assert_eq!(clamp_percent(f32::NAN), 0.0);
        assert_eq!(clamp_percent(42.5), 42.5);
    }
}
