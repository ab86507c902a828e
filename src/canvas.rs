// ============================================================================
// CANVAS - in-memory RGBA drawing surface
// ============================================================================
//
// Every raster operation in the engine draws into a `Canvas`: scaled image
// placement, brush stamps, destination-out removal and glyph coverage.  The
// surface is a plain `RgbaImage` (straight alpha), so operations are pure
// functions of (input buffers, parameters) and need no display.

use image::{GrayImage, Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::error::{Result, ThumbError};

/// Largest edge accepted for a drawing surface.
pub const MAX_CANVAS_EDGE: u32 = 16384;

/// Single-channel coverage (0.0–1.0) positioned in canvas space.
///
/// `off_x`/`off_y` is the canvas coordinate of the buffer's top-left pixel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Coverage {
    pub buf: Vec<f32>,
    pub buf_w: u32,
    pub buf_h: u32,
    pub off_x: i32,
    pub off_y: i32,
}

impl Coverage {
    pub fn new(buf_w: u32, buf_h: u32, off_x: i32, off_y: i32) -> Self {
        Self {
            buf: vec![0.0; buf_w as usize * buf_h as usize],
            buf_w,
            buf_h,
            off_x,
            off_y,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf_w == 0 || self.buf_h == 0 || self.buf.iter().all(|&c| c <= 0.0)
    }

    /// Coverage at a local buffer coordinate; 0 outside the buffer.
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if x < 0 || y < 0 || x >= self.buf_w as i32 || y >= self.buf_h as i32 {
            return 0.0;
        }
        self.buf[y as usize * self.buf_w as usize + x as usize]
    }

    /// Coverage at a canvas coordinate.
    pub fn at_canvas(&self, x: i32, y: i32) -> f32 {
        self.get(x - self.off_x, y - self.off_y)
    }

    /// Same coverage moved by `(dx, dy)` canvas pixels.
    pub fn translated(&self, dx: i32, dy: i32) -> Coverage {
        Coverage {
            off_x: self.off_x + dx,
            off_y: self.off_y + dy,
            ..self.clone()
        }
    }

    /// Per-pixel maximum of several coverages over their joint bounds.
    pub fn union(parts: &[Coverage]) -> Coverage {
        let parts: Vec<&Coverage> = parts.iter().filter(|c| c.buf_w > 0 && c.buf_h > 0).collect();
        if parts.is_empty() {
            return Coverage::default();
        }
        let x0 = parts.iter().map(|c| c.off_x).min().unwrap_or(0);
        let y0 = parts.iter().map(|c| c.off_y).min().unwrap_or(0);
        let x1 = parts.iter().map(|c| c.off_x + c.buf_w as i32).max().unwrap_or(0);
        let y1 = parts.iter().map(|c| c.off_y + c.buf_h as i32).max().unwrap_or(0);
        let mut out = Coverage::new((x1 - x0) as u32, (y1 - y0) as u32, x0, y0);
        for part in parts {
            for ly in 0..part.buf_h {
                let row = ly as usize * part.buf_w as usize;
                let oy = (part.off_y - y0) as usize + ly as usize;
                for lx in 0..part.buf_w {
                    let ox = (part.off_x - x0) as usize + lx as usize;
                    let idx = oy * out.buf_w as usize + ox;
                    out.buf[idx] = out.buf[idx].max(part.buf[row + lx as usize]);
                }
            }
        }
        out
    }

    /// Grow the covered region outward by `radius` pixels with an
    /// anti-aliased edge.  The bounds grow so nothing is clipped.
    ///
    /// Pixels with coverage >= 0.5 are treated as solid; the ring around
    /// them comes from an exact Euclidean distance transform, so the cost is
    /// linear in the output size whatever the radius.
    pub fn dilated(&self, radius: f32) -> Coverage {
        if radius <= 0.0 || self.buf_w == 0 || self.buf_h == 0 {
            return self.clone();
        }
        let reach = (radius + 0.5).ceil() as i32;
        let out_w = self.buf_w as usize + 2 * reach as usize;
        let out_h = self.buf_h as usize + 2 * reach as usize;

        // squared distance to the nearest solid pixel, columns then rows
        let mut dist = vec![EDT_INF; out_w * out_h];
        for y in 0..out_h {
            for x in 0..out_w {
                if self.get(x as i32 - reach, y as i32 - reach) >= 0.5 {
                    dist[y * out_w + x] = 0.0;
                }
            }
        }
        let mut column = vec![0.0f64; out_h];
        let mut column_out = vec![0.0f64; out_h];
        let mut scratch = EdtScratch::new(out_h);
        for x in 0..out_w {
            for y in 0..out_h {
                column[y] = dist[y * out_w + x];
            }
            scratch.transform(&column, &mut column_out);
            for y in 0..out_h {
                dist[y * out_w + x] = column_out[y];
            }
        }
        dist.par_chunks_mut(out_w).for_each(|row| {
            let input = row.to_vec();
            EdtScratch::new(out_w).transform(&input, row);
        });

        let mut out = Coverage::new(out_w as u32, out_h as u32, self.off_x - reach, self.off_y - reach);
        out.buf
            .par_chunks_mut(out_w)
            .zip(dist.par_chunks(out_w))
            .enumerate()
            .for_each(|(oy, (row, dist_row))| {
                let sy = oy as i32 - reach;
                for (ox, (cell, &d2)) in row.iter_mut().zip(dist_row).enumerate() {
                    let ring = (radius + 0.5 - d2.sqrt() as f32).clamp(0.0, 1.0);
                    *cell = ring.max(self.get(ox as i32 - reach, sy));
                }
            });
        out
    }

    /// The part of this coverage inside `clip`.
    pub fn clipped(&self, clip: Region) -> Coverage {
        let own = Region::new(
            self.off_x,
            self.off_y,
            self.off_x + self.buf_w as i32,
            self.off_y + self.buf_h as i32,
        );
        let Some(keep) = own.intersect(clip) else { return Coverage::default() };
        if keep == own {
            return self.clone();
        }
        let mut out = Coverage::new(keep.width(), keep.height(), keep.x0, keep.y0);
        for y in keep.y0..keep.y1 {
            for x in keep.x0..keep.x1 {
                let idx = (y - keep.y0) as usize * out.buf_w as usize + (x - keep.x0) as usize;
                out.buf[idx] = self.at_canvas(x, y);
            }
        }
        out
    }
}

const EDT_INF: f64 = 1e20;

/// Felzenszwalb–Huttenlocher 1-D squared distance transform.
struct EdtScratch {
    v: Vec<usize>,
    z: Vec<f64>,
}

impl EdtScratch {
    fn new(n: usize) -> Self {
        Self {
            v: vec![0; n.max(1)],
            z: vec![0.0; n + 1],
        }
    }

    fn transform(&mut self, f: &[f64], out: &mut [f64]) {
        let n = f.len();
        if n == 0 {
            return;
        }
        let mut k = 0usize;
        self.v[0] = 0;
        self.z[0] = f64::NEG_INFINITY;
        self.z[1] = f64::INFINITY;
        for q in 1..n {
            let fq = f[q] + (q * q) as f64;
            loop {
                let p = self.v[k];
                let s = (fq - (f[p] + (p * p) as f64)) / (2.0 * (q - p) as f64);
                // z[0] is -inf, so k never drops below zero
                if k > 0 && s <= self.z[k] {
                    k -= 1;
                    continue;
                }
                k += 1;
                self.v[k] = q;
                self.z[k] = s;
                self.z[k + 1] = f64::INFINITY;
                break;
            }
        }
        k = 0;
        for (q, slot) in out.iter_mut().enumerate().take(n) {
            while self.z[k + 1] < q as f64 {
                k += 1;
            }
            let p = self.v[k];
            let d = q as f64 - p as f64;
            *slot = d * d + f[p];
        }
    }
}

/// Half-open integer rectangle `[x0, x1) × [y0, y1)` in canvas space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Region {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// The whole of a `width × height` surface.
    pub fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width.min(i32::MAX as u32) as i32, height.min(i32::MAX as u32) as i32)
    }

    /// Grown by `margin` on every side.
    pub fn expanded(self, margin: i32) -> Self {
        Self::new(
            self.x0.saturating_sub(margin),
            self.y0.saturating_sub(margin),
            self.x1.saturating_add(margin),
            self.y1.saturating_add(margin),
        )
    }

    pub fn intersect(self, other: Region) -> Option<Region> {
        let r = Region::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        (r.x0 < r.x1 && r.y0 < r.y1).then_some(r)
    }

    pub fn width(&self) -> u32 {
        (self.x1 as i64 - self.x0 as i64).clamp(0, u32::MAX as i64) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y1 as i64 - self.y0 as i64).clamp(0, u32::MAX as i64) as u32
    }
}

/// Anything glyph coverage can be painted onto.
///
/// Text rendering only talks to this trait, so tests can record which
/// passes ran without inspecting pixels.
pub trait DrawTarget {
    /// Fill the covered area with `color`.
    fn fill_coverage(&mut self, coverage: &Coverage, color: Rgba<u8>);

    /// Stroke the outline of the covered area.  `line_width` is centered on
    /// the outline, so half of it lands outside the shape.
    fn stroke_coverage(&mut self, coverage: &Coverage, color: Rgba<u8>, line_width: f32);
}

/// Straight-alpha source-over of `src` (with extra `coverage`) onto `dst`.
#[inline]
pub fn blend_source_over(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: f32) {
    let sa = (src[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// An owned RGBA drawing surface.
#[derive(Clone, Debug)]
pub struct Canvas {
    pixels: RgbaImage,
}

impl Canvas {
    /// Transparent surface of `width × height`.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::filled(width, height, Rgba([0, 0, 0, 0]))
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ThumbError::canvas_unavailable(format!(
                "cannot allocate a {}x{} surface",
                width, height
            )));
        }
        if width > MAX_CANVAS_EDGE || height > MAX_CANVAS_EDGE {
            return Err(ThumbError::canvas_unavailable(format!(
                "{}x{} exceeds the {}px surface limit",
                width, height, MAX_CANVAS_EDGE
            )));
        }
        Ok(Self {
            pixels: RgbaImage::from_pixel(width, height, color),
        })
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    /// Draw `src` scaled to `w × h` with its top-left at `(x, y)`, source-over.
    pub fn draw_image(&mut self, src: &RgbaImage, x: i32, y: i32, w: u32, h: u32) {
        if w == 0 || h == 0 || src.width() == 0 || src.height() == 0 {
            return;
        }
        let scaled;
        let src = if src.dimensions() == (w, h) {
            src
        } else {
            scaled = imageops::resize(src, w, h, imageops::FilterType::Triangle);
            &scaled
        };

        let cw = self.pixels.width();
        let row_len = cw as usize * 4;
        let raw: &mut [u8] = &mut self.pixels;
        raw.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(cy, row)| {
                let sy = cy as i32 - y;
                if sy < 0 || sy >= h as i32 {
                    return;
                }
                let x0 = x.max(0);
                let x1 = (x + w as i32).min(cw as i32);
                for cx in x0..x1 {
                    let s = *src.get_pixel((cx - x) as u32, sy as u32);
                    let i = cx as usize * 4;
                    let mut d = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                    blend_source_over(&mut d, s, 1.0);
                    row[i..i + 4].copy_from_slice(&d.0);
                }
            });
    }

    /// Stamp an anti-aliased filled circle of `diameter` centered on `(cx, cy)`.
    pub fn fill_circle(&mut self, cx: f32, cy: f32, diameter: f32, color: Rgba<u8>) {
        let radius = diameter / 2.0;
        if radius <= 0.0 {
            return;
        }
        let (w, h) = self.pixels.dimensions();
        let min_x = (cx - radius - 1.0).floor().max(0.0) as u32;
        let min_y = (cy - radius - 1.0).floor().max(0.0) as u32;
        let max_x = ((cx + radius + 1.0).ceil().max(0.0) as u32).min(w);
        let max_y = ((cy + radius + 1.0).ceil().max(0.0) as u32).min(h);
        for py in min_y..max_y {
            for px in min_x..max_x {
                // sample at pixel centers
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let d = (dx * dx + dy * dy).sqrt();
                let cov = (radius + 0.5 - d).clamp(0.0, 1.0);
                if cov > 0.0 {
                    blend_source_over(self.pixels.get_pixel_mut(px, py), color, cov);
                }
            }
        }
    }

    /// Destination-out: remove alpha wherever the mask is opaque.
    ///
    /// Mask luminance is the removal strength (white = fully removed, black =
    /// untouched).  The mask must already match the surface dimensions.
    pub fn destination_out(&mut self, mask: &GrayImage) -> Result<()> {
        if mask.dimensions() != self.pixels.dimensions() {
            return Err(ThumbError::canvas_unavailable(format!(
                "mask is {}x{} but surface is {}x{}",
                mask.width(),
                mask.height(),
                self.pixels.width(),
                self.pixels.height()
            )));
        }
        let mask_raw = mask.as_raw();
        let raw: &mut [u8] = &mut self.pixels;
        raw.par_chunks_mut(4)
            .zip(mask_raw.par_iter())
            .for_each(|(px, &m)| {
                if m == 0 {
                    return;
                }
                let keep = 1.0 - m as f32 / 255.0;
                px[3] = (px[3] as f32 * keep).round() as u8;
                if px[3] == 0 {
                    px[0] = 0;
                    px[1] = 0;
                    px[2] = 0;
                }
            });
        Ok(())
    }

    /// Paint `coverage` in `color` (alpha scaled by coverage), source-over.
    pub fn paint_coverage(&mut self, coverage: &Coverage, color: Rgba<u8>) {
        let (w, h) = self.pixels.dimensions();
        for ly in 0..coverage.buf_h {
            let cy = coverage.off_y + ly as i32;
            if cy < 0 || cy >= h as i32 {
                continue;
            }
            for lx in 0..coverage.buf_w {
                let cx = coverage.off_x + lx as i32;
                if cx < 0 || cx >= w as i32 {
                    continue;
                }
                let cov = coverage.buf[ly as usize * coverage.buf_w as usize + lx as usize];
                if cov > 0.001 {
                    blend_source_over(self.pixels.get_pixel_mut(cx as u32, cy as u32), color, cov);
                }
            }
        }
    }
}

impl DrawTarget for Canvas {
    fn fill_coverage(&mut self, coverage: &Coverage, color: Rgba<u8>) {
        self.paint_coverage(coverage, color);
    }

    fn stroke_coverage(&mut self, coverage: &Coverage, color: Rgba<u8>, line_width: f32) {
        if line_width <= 0.0 {
            return;
        }
        self.paint_coverage(&coverage.dilated(line_width / 2.0), color);
    }
}
