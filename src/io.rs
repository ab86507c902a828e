// ============================================================================
// IMAGE I/O - encoded image handles, decode/encode, data URLs, export files
// ============================================================================

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat, RgbaImage};

use crate::error::{Result, ThumbError};

/// Default export quality (canvas `toDataURL('image/jpeg', 0.9)` equivalent).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// An encoded raster (PNG, JPEG, WEBP …) shared cheaply between the document
/// and worker jobs.  Decoding happens on demand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    format: ImageFormat,
}

impl EncodedImage {
    /// Wrap raw file bytes, sniffing the format from the header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes)
            .map_err(|e| ThumbError::resource_load(format!("unrecognised image data: {}", e)))?;
        Ok(Self {
            bytes: bytes.into(),
            format,
        })
    }

    /// Encode as PNG (keeps the alpha channel).
    pub fn encode_png(image: &RgbaImage) -> Result<Self> {
        let mut buf = Cursor::new(Vec::new());
        PngEncoder::new(&mut buf).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgba8,
        )?;
        Ok(Self {
            bytes: buf.into_inner().into(),
            format: ImageFormat::Png,
        })
    }

    /// Encode as JPEG at `quality` (1–100).  Alpha is dropped.
    pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(ThumbError::encode(format!(
                "JPEG quality must be 1-100, got {}",
                quality
            )));
        }
        let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        let mut buf = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
        Ok(Self {
            bytes: buf.into_inner().into(),
            format: ImageFormat::Jpeg,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            _ => "application/octet-stream",
        }
    }

    pub fn decode_dynamic(&self) -> Result<DynamicImage> {
        image::load_from_memory_with_format(&self.bytes, self.format)
            .map_err(|e| ThumbError::resource_load(e.to_string()))
    }

    /// Pixel size from the header alone, without decoding.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        image::io::Reader::with_format(Cursor::new(&self.bytes[..]), self.format)
            .into_dimensions()
            .map_err(|e| ThumbError::resource_load(e.to_string()))
    }

    /// Decode to straight-alpha RGBA.
    pub fn decode(&self) -> Result<RgbaImage> {
        Ok(self.decode_dynamic()?.to_rgba8())
    }

    /// Whether the encoded pixel format carries an alpha channel.
    pub fn has_alpha(&self) -> Result<bool> {
        Ok(self.decode_dynamic()?.color().has_alpha())
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), BASE64.encode(&self.bytes))
    }

    /// Parse a base64 data URL.  The declared MIME type is ignored in favour
    /// of the actual header bytes.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| ThumbError::resource_load("not a data URL"))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| ThumbError::resource_load("data URL has no payload"))?;
        if !meta.ends_with(";base64") {
            return Err(ThumbError::resource_load("only base64 data URLs are supported"));
        }
        let bytes = BASE64.decode(payload.trim())?;
        Self::from_bytes(bytes)
    }
}

/// Read an image file from disk (the "upload" path).
pub fn load_file(path: &Path) -> Result<EncodedImage> {
    let bytes = std::fs::read(path).map_err(|e| {
        ThumbError::resource_load(format!("could not read '{}': {}", path.display(), e))
    })?;
    EncodedImage::from_bytes(bytes)
}

/// Write encoded bytes to `path`.
pub fn write_file(path: &Path, image: &EncodedImage) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(image.bytes())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 128])
            }
        })
    }

    #[test]
    fn dimensions_come_from_the_header() {
        let png = EncodedImage::encode_png(&checker(7, 3)).unwrap();
        assert_eq!(png.dimensions().unwrap(), (7, 3));
        let jpeg = EncodedImage::encode_jpeg(&checker(5, 9), 80).unwrap();
        assert_eq!(jpeg.dimensions().unwrap(), (5, 9));
    }

    #[test]
    fn data_url_round_trip_keeps_dimensions() {
        let img = checker(37, 21);
        let encoded = EncodedImage::encode_png(&img).unwrap();
        let url = encoded.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        let back = EncodedImage::from_data_url(&url).unwrap();
        assert_eq!(back, encoded);
        let decoded = back.decode().unwrap();
        assert_eq!(decoded.dimensions(), (37, 21));
        assert_eq!(decoded, img);
    }

    #[test]
    fn jpeg_has_no_alpha_png_does() {
        let img = checker(8, 8);
        let jpeg = EncodedImage::encode_jpeg(&img, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(jpeg.format(), ImageFormat::Jpeg);
        assert!(!jpeg.has_alpha().unwrap());
        assert!(EncodedImage::encode_png(&img).unwrap().has_alpha().unwrap());
    }

    #[test]
    fn garbage_bytes_are_resource_errors() {
        let err = EncodedImage::from_bytes(vec![1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, ThumbError::ResourceLoad(_)));
        assert!(matches!(
            EncodedImage::from_data_url("data:image/png;base64,@@@"),
            Err(ThumbError::ResourceLoad(_))
        ));
        assert!(EncodedImage::from_data_url("http://example.com/a.png").is_err());
    }

    #[test]
    fn jpeg_quality_out_of_range() {
        assert!(EncodedImage::encode_jpeg(&checker(2, 2), 0).is_err());
    }

    #[test]
    fn write_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let encoded = EncodedImage::encode_png(&checker(5, 3)).unwrap();
        write_file(&path, &encoded).unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.decode().unwrap().dimensions(), (5, 3));
    }
}
