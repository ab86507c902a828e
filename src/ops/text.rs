use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::canvas::{Coverage, DrawTarget, Region};
use crate::document::{FontFamily, TextLayer};
use crate::error::{Result, ThumbError};

/// Padding (pixels) around rasterized glyph coverage.
const COVERAGE_PAD: f32 = 2.0;

/// Largest font size the renderer accepts, in target pixels.
pub const MAX_FONT_SIZE: f32 = 2048.0;

/// Outline widths above this are drawn at this width.
pub const MAX_OUTLINE_WIDTH: f32 = 256.0;

/// Produces glyph coverage for a line (or lines) of text.
///
/// `origin` is the top-left of the text box in target pixels; text is laid
/// out left-aligned with the top of the first line at `origin.1`.  Only the
/// part of the text inside `clip` needs to be returned.
pub trait GlyphSource: Send + Sync {
    fn rasterize(
        &self,
        text: &str,
        family: FontFamily,
        font_size: f32,
        origin: (f32, f32),
        clip: Region,
    ) -> Result<Coverage>;
}

/// Reject font sizes the rasterizer cannot allocate for.
pub fn check_font_size(font_size: f32) -> Result<()> {
    if !font_size.is_finite() || font_size > MAX_FONT_SIZE {
        return Err(ThumbError::canvas_unavailable(format!(
            "font size {} exceeds the {}px text limit",
            font_size, MAX_FONT_SIZE
        )));
    }
    Ok(())
}

/// The outline width actually drawn for `layer`.
pub fn effective_outline_width(layer: &TextLayer) -> f32 {
    layer.outline_width.min(MAX_OUTLINE_WIDTH)
}

/// Lay out a single line of text, returning positioned glyphs.
/// Returns `(glyphs, total_width, ascent, line_height)`; glyph y is the baseline.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32, f32)>, f32, f32, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let line_height = scaled.height();

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, ascent));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x, ascent, line_height)
}

/// Rasterize `text` with `font` into a coverage buffer positioned in target
/// space, keeping only what falls inside `clip`.  Supports multiline text
/// via '\n'.
pub fn rasterize_with_font(
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: (f32, f32),
    clip: Region,
) -> Result<Coverage> {
    check_font_size(font_size)?;
    let (origin_x, origin_y) = origin;
    let line_height = font.as_scaled(font_size).height();

    let mut all_glyphs: Vec<(GlyphId, f32, f32)> = Vec::new();
    for (line_idx, line) in text.split('\n').enumerate() {
        let y_offset = line_idx as f32 * line_height;
        let (glyphs, _, _, _) = layout_line(font, line, font_size);
        all_glyphs.extend(glyphs.into_iter().map(|(id, x, y)| (id, x, y + y_offset)));
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx, gy) in &all_glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(gx, gy));
        let bounds = font.glyph_bounds(&glyph);
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if all_glyphs.is_empty() || min_x >= max_x || min_y >= max_y {
        return Ok(Coverage::default());
    }

    // float -> i32 casts saturate, so far-off text lands outside the clip
    let text_box = Region::new(
        (origin_x + min_x - COVERAGE_PAD).floor() as i32,
        (origin_y + min_y - COVERAGE_PAD).floor() as i32,
        (origin_x + max_x + COVERAGE_PAD).ceil() as i32,
        (origin_y + max_y + COVERAGE_PAD).ceil() as i32,
    );
    let Some(area) = text_box.intersect(clip) else { return Ok(Coverage::default()) };
    let mut coverage = Coverage::new(area.width(), area.height(), area.x0, area.y0);

    for &(glyph_id, gx, gy) in &all_glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin_x + gx, origin_y + gy));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let b = outlined.px_bounds();
            let glyph_box = Region::new(
                b.min.x.floor() as i32,
                b.min.y.floor() as i32,
                b.max.x.ceil() as i32,
                b.max.y.ceil() as i32,
            );
            if glyph_box.intersect(area).is_none() {
                continue;
            }
            outlined.draw(|px, py, cov| {
                let ix = (b.min.x as i32 + px as i32) - area.x0;
                let iy = (b.min.y as i32 + py as i32) - area.y0;
                if ix >= 0 && iy >= 0 && (ix as u32) < coverage.buf_w && (iy as u32) < coverage.buf_h {
                    let idx = iy as usize * coverage.buf_w as usize + ix as usize;
                    coverage.buf[idx] = coverage.buf[idx].max(cov);
                }
            });
        }
    }

    Ok(coverage)
}

/// Draw a layer's glyphs the exact way: stroke the outline at twice the
/// outline width (the stroke is centered on the glyph edge), then fill.
/// With `outline_width <= 0` the stroke pass is skipped entirely.
pub fn render_outline_text(target: &mut dyn DrawTarget, coverage: &Coverage, layer: &TextLayer) {
    if coverage.is_empty() {
        return;
    }
    let outline = effective_outline_width(layer);
    if outline > 0.0 {
        target.stroke_coverage(coverage, layer.outline_color.to_rgba(), outline * 2.0);
    }
    target.fill_coverage(coverage, layer.color.to_rgba());
}

/// One offset copy of the glyphs used by the preview outline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextShadow {
    pub dx: f32,
    pub dy: f32,
}

/// The preview outline: eight copies offset by `outline_width` toward
/// N, S, E, W, NE, NW, SE, SW.  Close to a true stroke, not pixel-identical.
pub fn preview_shadow_stack(layer: &TextLayer) -> Vec<TextShadow> {
    let w = effective_outline_width(layer);
    if w <= 0.0 {
        return Vec::new();
    }
    [
        (0.0, -w),
        (0.0, w),
        (w, 0.0),
        (-w, 0.0),
        (w, -w),
        (-w, -w),
        (w, w),
        (-w, w),
    ]
    .into_iter()
    .map(|(dx, dy)| TextShadow { dx, dy })
    .collect()
}

/// The preview stack as a CSS `text-shadow` value, for web front ends.
pub fn css_text_shadow(layer: &TextLayer) -> String {
    let color = layer.outline_color.to_string();
    preview_shadow_stack(layer)
        .iter()
        .map(|s| format!("{}px {}px 0 {}", fmt_px(s.dx), fmt_px(s.dy), color))
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_px(v: f32) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Draw a layer the preview way: the eight-offset shadow stack in the
/// outline color, then the fill.
pub fn render_preview_text(target: &mut dyn DrawTarget, coverage: &Coverage, layer: &TextLayer) {
    if coverage.is_empty() {
        return;
    }
    let shadows: Vec<Coverage> = preview_shadow_stack(layer)
        .iter()
        .map(|s| coverage.translated(s.dx.round() as i32, s.dy.round() as i32))
        .collect();
    if !shadows.is_empty() {
        target.fill_coverage(&Coverage::union(&shadows), layer.outline_color.to_rgba());
    }
    target.fill_coverage(coverage, layer.color.to_rgba());
}

// ============================================================================
// FONT BOOK - ab_glyph fonts resolved from a font directory or the system
// ============================================================================

/// Loads and caches one `FontArc` per family.
///
/// Lookup order: `<font_dir>/<Family>.ttf|.otf`, the system font with that
/// family name, then the fallback font (explicit or system sans-serif).
pub struct FontBook {
    font_dir: Option<PathBuf>,
    fallback: Mutex<Option<FontArc>>,
    fonts: Mutex<HashMap<FontFamily, FontArc>>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FontBook {
    pub fn new(font_dir: Option<PathBuf>) -> Self {
        Self {
            font_dir,
            fallback: Mutex::new(None),
            fonts: Mutex::new(HashMap::new()),
        }
    }

    /// Use the font at `path` for any family that cannot be resolved.
    pub fn with_fallback_file(self, path: &Path) -> Result<Self> {
        let font = load_font_file(path)?;
        if let Ok(mut slot) = self.fallback.lock() {
            *slot = Some(font);
        }
        Ok(self)
    }

    /// Resolve the font for `family`.
    pub fn font(&self, family: FontFamily) -> Result<FontArc> {
        if let Ok(fonts) = self.fonts.lock()
            && let Some(font) = fonts.get(&family)
        {
            return Ok(font.clone());
        }

        let font = self
            .font_from_dir(family)
            .or_else(|| load_system_font(family.name(), family.weight(), false))
            .or_else(|| self.fallback_font())
            .ok_or_else(|| {
                ThumbError::font_unavailable(format!("no font found for family '{}'", family.name()))
            })?;

        if let Ok(mut fonts) = self.fonts.lock() {
            fonts.insert(family, font.clone());
        }
        Ok(font)
    }

    fn font_from_dir(&self, family: FontFamily) -> Option<FontArc> {
        let dir = self.font_dir.as_ref()?;
        let compact: String = family.name().chars().filter(|c| !c.is_whitespace()).collect();
        for stem in [family.name().to_string(), compact] {
            for ext in ["ttf", "otf"] {
                let path = dir.join(format!("{}.{}", stem, ext));
                if path.is_file() {
                    match load_font_file(&path) {
                        Ok(font) => return Some(font),
                        Err(e) => warn!("skipping font {}: {}", path.display(), e),
                    }
                }
            }
        }
        None
    }

    fn fallback_font(&self) -> Option<FontArc> {
        if let Ok(slot) = self.fallback.lock()
            && let Some(font) = slot.as_ref()
        {
            return Some(font.clone());
        }
        debug!("falling back to system sans-serif");
        load_system_sans_serif()
    }
}

impl GlyphSource for FontBook {
    fn rasterize(
        &self,
        text: &str,
        family: FontFamily,
        font_size: f32,
        origin: (f32, f32),
        clip: Region,
    ) -> Result<Coverage> {
        check_font_size(font_size)?;
        if font_size <= 0.0 || text.trim().is_empty() {
            return Ok(Coverage::default());
        }
        let font = self.font(family)?;
        rasterize_with_font(&font, text, font_size, origin, clip)
    }
}

/// Load a TTF/OTF file.
pub fn load_font_file(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| ThumbError::font_unavailable(format!("{}: {}", path.display(), e)))
}

/// Load a font by family name and weight from the system.
/// Returns None if the font cannot be found.
pub fn load_system_font(family: &str, weight: u16, italic: bool) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);
    if italic {
        props.style = Style::Italic;
    }

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::Title(family.to_string())], &props)
        .ok()?;
    font_from_handle(handle)
}

fn load_system_sans_serif() -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::SansSerif], &Properties::new())
        .ok()?;
    font_from_handle(handle)
}

fn font_from_handle(handle: font_kit::handle::Handle) -> Option<FontArc> {
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::document::HexColor;
    use image::Rgba;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
        stroke_width: Option<f32>,
    }

    impl DrawTarget for Recorder {
        fn fill_coverage(&mut self, _coverage: &Coverage, _color: Rgba<u8>) {
            self.calls.push("fill");
        }
        fn stroke_coverage(&mut self, _coverage: &Coverage, _color: Rgba<u8>, line_width: f32) {
            self.calls.push("stroke");
            self.stroke_width = Some(line_width);
        }
    }

    fn block(x: i32, y: i32, w: u32, h: u32) -> Coverage {
        let mut c = Coverage::new(w, h, x, y);
        c.buf.fill(1.0);
        c
    }

    fn layer(outline_width: f32) -> TextLayer {
        TextLayer {
            outline_width,
            ..TextLayer::default()
        }
    }

    #[test]
    fn outline_strokes_at_double_width_before_fill() {
        let mut rec = Recorder::default();
        render_outline_text(&mut rec, &block(0, 0, 4, 4), &layer(5.0));
        assert_eq!(rec.calls, vec!["stroke", "fill"]);
        assert_eq!(rec.stroke_width, Some(10.0));
    }

    #[test]
    fn zero_outline_skips_stroke() {
        let mut rec = Recorder::default();
        render_outline_text(&mut rec, &block(0, 0, 4, 4), &layer(0.0));
        assert_eq!(rec.calls, vec!["fill"]);
        let mut rec = Recorder::default();
        render_outline_text(&mut rec, &block(0, 0, 4, 4), &layer(-2.0));
        assert_eq!(rec.calls, vec!["fill"]);
    }

    #[test]
    fn exact_outline_surrounds_fill() {
        let mut canvas = Canvas::new(30, 30).unwrap();
        let mut l = layer(3.0);
        l.color = HexColor::rgb(255, 0, 0);
        l.outline_color = HexColor::rgb(0, 0, 255);
        render_outline_text(&mut canvas, &block(10, 10, 10, 10), &l);
        assert_eq!(*canvas.image().get_pixel(15, 15), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.image().get_pixel(8, 15), Rgba([0, 0, 255, 255]));
        assert_eq!(canvas.image().get_pixel(3, 15)[3], 0);
    }

    #[test]
    fn shadow_stack_has_eight_directions() {
        let stack = preview_shadow_stack(&layer(4.0));
        assert_eq!(stack.len(), 8);
        assert!(stack.contains(&TextShadow { dx: 0.0, dy: -4.0 }));
        assert!(stack.contains(&TextShadow { dx: -4.0, dy: 4.0 }));
        assert!(preview_shadow_stack(&layer(0.0)).is_empty());
    }

    #[test]
    fn css_text_shadow_lists_offsets() {
        let css = css_text_shadow(&layer(5.0));
        assert!(css.starts_with("0px -5px 0 #000000"));
        assert_eq!(css.matches("#000000").count(), 8);
        assert_eq!(css_text_shadow(&layer(0.0)), "");
    }

    #[test]
    fn preview_and_exact_differ_at_corners() {
        let mut l = layer(4.0);
        l.outline_color = HexColor::rgb(0, 0, 255);
        let glyph = block(10, 10, 6, 6);
        let mut exact = Canvas::new(30, 30).unwrap();
        render_outline_text(&mut exact, &glyph, &l);
        let mut preview = Canvas::new(30, 30).unwrap();
        render_preview_text(&mut preview, &glyph, &l);
        // the shadow stack reaches the full diagonal corner, the round stroke does not
        assert!(preview.image().get_pixel(6, 6)[3] > 0);
        assert_eq!(exact.image().get_pixel(6, 6)[3], 0);
    }

    #[test]
    fn oversized_font_is_refused_before_font_lookup() {
        let book = FontBook::default();
        let err = book
            .rasterize("BIG", FontFamily::Impact, 60000.0, (0.0, 0.0), Region::of_size(1280, 720))
            .unwrap_err();
        assert!(matches!(err, ThumbError::CanvasUnavailable(_)));
        assert!(check_font_size(f32::INFINITY).is_err());
        assert!(check_font_size(MAX_FONT_SIZE).is_ok());
    }

    #[test]
    fn outline_width_is_capped_when_drawn() {
        let mut rec = Recorder::default();
        render_outline_text(&mut rec, &block(0, 0, 4, 4), &layer(10_000.0));
        assert_eq!(rec.stroke_width, Some(MAX_OUTLINE_WIDTH * 2.0));
        let stack = preview_shadow_stack(&layer(10_000.0));
        assert!(stack.iter().all(|s| s.dx.abs() <= MAX_OUTLINE_WIDTH && s.dy.abs() <= MAX_OUTLINE_WIDTH));
    }

    #[test]
    fn missing_font_dir_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let book = FontBook::new(Some(dir.path().to_path_buf()));
        assert!(book.font_from_dir(FontFamily::Impact).is_none());
    }
}
