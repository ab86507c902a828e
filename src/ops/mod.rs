//! Raster operations on top of the canvas: retouch masks, text, compositing.

pub mod compositor;
pub mod mask;
pub mod text;
