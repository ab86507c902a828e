// ============================================================================
// MASK ENGINE - freehand retouch strokes → strict black/white mask
// ============================================================================
//
// Strokes are painted in translucent white so the user sees buildup, but the
// mask handed downstream is strictly binary: it drives an exact
// destination-out removal, and partial alpha would leave half-erased pixels.

use image::{GrayImage, Luma, Rgba, RgbaImage, imageops};

use crate::canvas::Canvas;
use crate::error::Result;
use crate::io::EncodedImage;

/// Opacity of a single brush stamp on the overlay.
pub const OVERLAY_ALPHA: f32 = 0.7;

const MARKED: u8 = 255;
const UNMARKED: u8 = 0;

/// A derived mask: opaque white = marked, opaque black = untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryMask {
    pixels: GrayImage,
    has_marked_pixels: bool,
}

impl BinaryMask {
    /// Threshold an overlay: any non-zero alpha becomes marked.
    pub fn from_overlay(overlay: &RgbaImage) -> Self {
        let (w, h) = overlay.dimensions();
        let mut pixels = GrayImage::new(w, h);
        let mut has_marked_pixels = false;
        for (dst, src) in pixels.pixels_mut().zip(overlay.pixels()) {
            if src[3] > 0 {
                *dst = Luma([MARKED]);
                has_marked_pixels = true;
            } else {
                *dst = Luma([UNMARKED]);
            }
        }
        Self {
            pixels,
            has_marked_pixels,
        }
    }

    /// Wrap an existing luminance image, snapping it to black/white.
    pub fn from_luma(mut pixels: GrayImage) -> Self {
        let mut has_marked_pixels = false;
        for px in pixels.pixels_mut() {
            if px[0] >= 128 {
                px[0] = MARKED;
                has_marked_pixels = true;
            } else {
                px[0] = UNMARKED;
            }
        }
        Self {
            pixels,
            has_marked_pixels,
        }
    }

    pub fn has_marked_pixels(&self) -> bool {
        self.has_marked_pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn luma(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn is_marked(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y)[0] == MARKED
    }

    /// Nearest-neighbour resample to `width × height`; stays strictly binary.
    pub fn resampled(&self, width: u32, height: u32) -> BinaryMask {
        if self.pixels.dimensions() == (width, height) {
            return self.clone();
        }
        let pixels = imageops::resize(&self.pixels, width, height, imageops::FilterType::Nearest);
        Self::from_luma(pixels)
    }

    /// The mask as an opaque RGBA image (white / black).
    pub fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_fn(self.pixels.width(), self.pixels.height(), |x, y| {
            let v = self.pixels.get_pixel(x, y)[0];
            Rgba([v, v, v, 255])
        })
    }

    pub fn encode_png(&self) -> Result<EncodedImage> {
        EncodedImage::encode_png(&self.to_rgba())
    }

    pub fn to_data_url(&self) -> Result<String> {
        Ok(self.encode_png()?.to_data_url())
    }
}

/// Retouch overlay plus the mask derived from it.
#[derive(Clone, Debug)]
pub struct MaskEngine {
    overlay: Option<Canvas>,
    derived: Option<BinaryMask>,
    stroking: bool,
}

impl Default for MaskEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskEngine {
    pub fn new() -> Self {
        Self {
            overlay: None,
            derived: None,
            stroking: false,
        }
    }

    /// Size the overlay to the container's displayed size.  A size change
    /// reallocates the buffer, which drops any strokes painted so far.
    /// Returns `true` when the buffer was (re)allocated.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        if let Some(overlay) = &self.overlay
            && overlay.dimensions() == (width, height)
        {
            return Ok(false);
        }
        self.overlay = Some(Canvas::new(width, height)?);
        self.stroking = false;
        Ok(true)
    }

    pub fn overlay_size(&self) -> Option<(u32, u32)> {
        self.overlay.as_ref().map(|o| o.dimensions())
    }

    pub fn overlay(&self) -> Option<&RgbaImage> {
        self.overlay.as_ref().map(|o| o.image())
    }

    pub fn is_stroking(&self) -> bool {
        self.stroking
    }

    pub fn begin_stroke(&mut self) {
        if self.overlay.is_some() {
            self.stroking = true;
        }
    }

    /// Stamp a translucent white disc of `diameter` at `point` (overlay
    /// pixel space).  Ignored outside a stroke.
    pub fn paint_at(&mut self, point: (f32, f32), diameter: f32) -> bool {
        if !self.stroking {
            return false;
        }
        let Some(overlay) = self.overlay.as_mut() else {
            return false;
        };
        let alpha = (OVERLAY_ALPHA * 255.0).round() as u8;
        overlay.fill_circle(point.0, point.1, diameter, Rgba([255, 255, 255, alpha]));
        true
    }

    /// Finish the stroke and rederive the binary mask from the whole overlay.
    pub fn end_stroke(&mut self) -> Option<&BinaryMask> {
        self.stroking = false;
        let overlay = self.overlay.as_ref()?;
        self.derived = Some(BinaryMask::from_overlay(overlay.image()));
        self.derived.as_ref()
    }

    /// The most recently derived mask, if any.
    pub fn mask(&self) -> Option<&BinaryMask> {
        self.derived.as_ref()
    }

    /// True only when a derived mask exists and marks at least one pixel.
    pub fn has_mask(&self) -> bool {
        self.derived.as_ref().is_some_and(|m| m.has_marked_pixels())
    }

    /// Erase the overlay and discard the derived mask.
    pub fn clear(&mut self) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.clear();
        }
        self.derived = None;
        self.stroking = false;
    }

    /// Drop the overlay buffer entirely (document reset).
    pub fn release(&mut self) {
        self.overlay = None;
        self.derived = None;
        self.stroking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_overlay_has_no_marked_pixels() {
        let mut engine = MaskEngine::new();
        engine.resize(40, 30).unwrap();
        engine.begin_stroke();
        let mask = engine.end_stroke().unwrap();
        assert!(!mask.has_marked_pixels());
        assert_eq!(mask.dimensions(), (40, 30));
        assert!(!engine.has_mask());
    }

    #[test]
    fn stroke_marks_pixels_strictly_binary() {
        let mut engine = MaskEngine::new();
        engine.resize(50, 50).unwrap();
        engine.begin_stroke();
        assert!(engine.paint_at((25.0, 25.0), 10.0));
        assert!(engine.paint_at((27.0, 25.0), 10.0));
        let mask = engine.end_stroke().unwrap().clone();
        assert!(mask.has_marked_pixels());
        assert!(mask.is_marked(25, 25));
        assert!(!mask.is_marked(0, 0));
        assert!(mask.luma().pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(mask.to_rgba().pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn overlapping_stamps_accumulate_alpha() {
        let mut engine = MaskEngine::new();
        engine.resize(20, 20).unwrap();
        engine.begin_stroke();
        engine.paint_at((10.0, 10.0), 8.0);
        let single = engine.overlay().unwrap().get_pixel(10, 10)[3];
        engine.paint_at((10.0, 10.0), 8.0);
        let double = engine.overlay().unwrap().get_pixel(10, 10)[3];
        assert!(single < 255);
        assert!(double > single);
    }

    #[test]
    fn painting_outside_stroke_is_ignored() {
        let mut engine = MaskEngine::new();
        engine.resize(20, 20).unwrap();
        assert!(!engine.paint_at((10.0, 10.0), 8.0));
        assert!(engine.overlay().unwrap().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn resize_clears_strokes_same_size_keeps_them() {
        let mut engine = MaskEngine::new();
        engine.resize(20, 20).unwrap();
        engine.begin_stroke();
        engine.paint_at((10.0, 10.0), 8.0);
        engine.end_stroke();
        assert!(!engine.resize(20, 20).unwrap());
        assert!(engine.overlay().unwrap().get_pixel(10, 10)[3] > 0);
        assert!(engine.resize(30, 20).unwrap());
        assert!(engine.overlay().unwrap().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn clear_discards_mask() {
        let mut engine = MaskEngine::new();
        engine.resize(20, 20).unwrap();
        engine.begin_stroke();
        engine.paint_at((5.0, 5.0), 6.0);
        engine.end_stroke();
        assert!(engine.has_mask());
        engine.clear();
        assert!(engine.mask().is_none());
        assert!(engine.overlay().unwrap().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn resample_to_natural_size_stays_binary() {
        let mut luma = GrayImage::new(10, 10);
        for y in 0..5 {
            for x in 0..5 {
                luma.put_pixel(x, y, Luma([255]));
            }
        }
        let mask = BinaryMask::from_luma(luma);
        let big = mask.resampled(40, 40);
        assert_eq!(big.dimensions(), (40, 40));
        assert!(big.is_marked(0, 0));
        assert!(big.is_marked(19, 19));
        assert!(!big.is_marked(20, 20));
        assert!(big.luma().pixels().all(|p| p[0] == 0 || p[0] == 255));
    }
}
