// ============================================================================
// COMPOSITOR - subject cutouts, mask removal, crop extraction, flatten/export
// ============================================================================

use image::{Rgba, RgbaImage, imageops};
use tracing::debug;

use crate::canvas::{Canvas, DrawTarget, Region};
use crate::config::EngineSettings;
use crate::document::{Document, TextLayer};
use crate::error::{Result, ThumbError};
use crate::geometry::{self, PixelRect, ScaleFactors};
use crate::io::EncodedImage;
use crate::ops::mask::BinaryMask;
use crate::ops::text::{
    GlyphSource, check_font_size, effective_outline_width, render_outline_text, render_preview_text,
};

/// Default export box.
pub const OUTPUT_WIDTH: u32 = 1280;
pub const OUTPUT_HEIGHT: u32 = 720;

/// Subject box: at most a third of the frame wide, 90% of it tall.
const SUBJECT_MAX_WIDTH_FRACTION: f32 = 1.0 / 3.0;
const SUBJECT_MAX_HEIGHT_FRACTION: f32 = 0.9;
/// Gap between the subject and the right frame edge, as a fraction of width.
const SUBJECT_RIGHT_MARGIN_FRACTION: f32 = 0.05;

const FLATTEN_BASE: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Where the matted subject lands in an `out_w × out_h` frame:
/// `(x, y, width, height)`.
pub fn subject_placement(subject_w: u32, subject_h: u32, out_w: u32, out_h: u32) -> (i32, i32, u32, u32) {
    let max_w = out_w as f32 * SUBJECT_MAX_WIDTH_FRACTION;
    let max_h = out_h as f32 * SUBJECT_MAX_HEIGHT_FRACTION;
    let scale = geometry::scale_to_fit(subject_w as f32, subject_h as f32, max_w, max_h);
    let (w, h) = geometry::fitted_size(subject_w, subject_h, scale);
    let margin = out_w as f32 * SUBJECT_RIGHT_MARGIN_FRACTION;
    let x = (out_w as f32 - margin - w as f32).round() as i32;
    let y = ((out_h as f32 - h as f32) / 2.0).round() as i32;
    (x, y, w, h)
}

/// Background stretched to the output box, subject source-over on the right.
pub fn composite_subject_on_background(
    background: &RgbaImage,
    subject: &RgbaImage,
    out_w: u32,
    out_h: u32,
) -> Result<RgbaImage> {
    let mut canvas = Canvas::new(out_w, out_h)?;
    canvas.draw_image(background, 0, 0, out_w, out_h);
    let (x, y, w, h) = subject_placement(subject.width(), subject.height(), out_w, out_h);
    debug!("subject placed at ({}, {}) {}x{}", x, y, w, h);
    canvas.draw_image(subject, x, y, w, h);
    Ok(canvas.into_image())
}

/// Destination-out with a binary mask: marked pixels become fully
/// transparent, everything else is untouched.  The mask is resampled to the
/// image's dimensions first when they differ.
pub fn apply_mask_removal(image: &RgbaImage, mask: &BinaryMask) -> Result<RgbaImage> {
    let (w, h) = image.dimensions();
    let mask = mask.resampled(w, h);
    let mut canvas = Canvas::from_image(image.clone());
    canvas.destination_out(mask.luma())?;
    Ok(canvas.into_image())
}

/// Map a completed display-space crop rectangle into natural space and cut
/// it out of `image`.
pub fn extract_crop(image: &RgbaImage, rect_display: PixelRect, scale: ScaleFactors) -> Result<RgbaImage> {
    if rect_display.is_empty() {
        return Err(ThumbError::invalid_crop("crop rectangle has no area"));
    }
    let natural = rect_display.scaled(scale);
    let (x, y, w, h) = natural.to_pixel_bounds(image.width(), image.height());
    if w == 0 || h == 0 {
        return Err(ThumbError::invalid_crop(format!(
            "crop ({:.1}, {:.1}, {:.1}x{:.1}) lies outside the {}x{} image",
            natural.x,
            natural.y,
            natural.width,
            natural.height,
            image.width(),
            image.height()
        )));
    }
    Ok(imageops::crop_imm(image, x, y, w, h).to_image())
}

/// How text outlines are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutlineStyle {
    /// True stroke, used for export.
    Exact,
    /// Eight-offset shadow stack, used for the interactive preview.
    Preview,
}

/// Draw `layers` in order onto `target`, each positioned at
/// `(left% × width, top% × height)` with top-left alignment.
pub fn draw_layers(
    target: &mut dyn DrawTarget,
    glyphs: &dyn GlyphSource,
    layers: &[TextLayer],
    width: u32,
    height: u32,
    style: OutlineStyle,
) -> Result<()> {
    for layer in layers {
        check_font_size(layer.font_size)?;
        let origin = geometry::percent_to_pixels(layer.left, layer.top, width, height);
        // glyphs just off the edge still feed the outline
        let margin = effective_outline_width(layer).max(0.0).ceil() as i32 + 2;
        let clip = Region::of_size(width, height).expanded(margin);
        let coverage = glyphs.rasterize(&layer.content, layer.font_family, layer.font_size, origin, clip)?;
        match style {
            OutlineStyle::Exact => render_outline_text(target, &coverage, layer),
            OutlineStyle::Preview => render_preview_text(target, &coverage, layer),
        }
    }
    Ok(())
}

fn base_canvas(document: &Document, width: u32, height: u32) -> Result<Canvas> {
    let mut canvas = Canvas::filled(width, height, FLATTEN_BASE)?;
    if let Some(background) = document.background() {
        let pixels = background.decode()?;
        canvas.draw_image(&pixels, 0, 0, width, height);
    }
    Ok(canvas)
}

/// Render the final raster: background scaled to the output box (black when
/// there is none), then every layer with a true outline stroke.
pub fn flatten(document: &Document, glyphs: &dyn GlyphSource, out_w: u32, out_h: u32) -> Result<RgbaImage> {
    let mut canvas = base_canvas(document, out_w, out_h)?;
    draw_layers(&mut canvas, glyphs, document.layers(), out_w, out_h, OutlineStyle::Exact)?;
    Ok(canvas.into_image())
}

/// Flatten at the configured output size and encode as JPEG.
pub fn export_jpeg(document: &Document, glyphs: &dyn GlyphSource, settings: &EngineSettings) -> Result<EncodedImage> {
    let flat = flatten(document, glyphs, settings.output_width, settings.output_height)?;
    EncodedImage::encode_jpeg(&flat, settings.jpeg_quality)
}

/// Render what the editor shows: same layout as `flatten`, but outlines use
/// the cheaper shadow stack.
pub fn render_preview(
    document: &Document,
    glyphs: &dyn GlyphSource,
    display_w: u32,
    display_h: u32,
) -> Result<RgbaImage> {
    let mut canvas = base_canvas(document, display_w, display_h)?;
    draw_layers(&mut canvas, glyphs, document.layers(), display_w, display_h, OutlineStyle::Preview)?;
    Ok(canvas.into_image())
}
