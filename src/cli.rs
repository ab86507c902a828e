// ============================================================================
// ThumbFE CLI - headless compose/export via command-line arguments
// ============================================================================
//
// Usage examples:
//   ThumbFE --background scene.jpg --layers title.json --output thumb.jpg
//   ThumbFE -b scene.png --subject host.png -o thumb.jpg --quality 85
//   ThumbFE -b photo.jpg --crop 120,0,1600,900 -l design.json -o out.jpg --font Impact.ttf
//
// No gateway is involved: every step here is local compositing.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};

use crate::config::EngineSettings;
use crate::document::{Document, TextLayer, TextSpec};
use crate::error::{Result, ThumbError};
use crate::gateway::DesignSpec;
use crate::geometry::{PixelRect, ScaleFactors};
use crate::io::{self, EncodedImage};
use crate::ops::compositor;
use crate::ops::text::FontBook;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// ThumbFE headless thumbnail compositor.
#[derive(Parser, Debug)]
#[command(
    name = "ThumbFE",
    about = "Compose a thumbnail from a background, an optional cut-out subject and text layers",
    long_about = "Composite a background image, an optional alpha-matted subject and\n\
                  styled text layers into a single JPEG thumbnail.\n\n\
                  Example:\n  \
                  ThumbFE --background scene.jpg --layers title.json --output thumb.jpg"
)]
pub struct CliArgs {
    /// Background image (PNG, JPEG, WEBP).
    #[arg(short, long, value_name = "IMAGE")]
    pub background: PathBuf,

    /// Subject with a transparent background, placed on the right third.
    #[arg(short, long, value_name = "PNG")]
    pub subject: Option<PathBuf>,

    /// Text layers: a JSON array of text specs, or a design object with
    /// `textElements`.
    #[arg(short, long, value_name = "JSON")]
    pub layers: Option<PathBuf>,

    /// Crop rectangle in background pixels: x,y,width,height.
    #[arg(short, long, value_name = "X,Y,W,H", value_parser = parse_crop)]
    pub crop: Option<PixelRect>,

    /// Output JPEG path.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// JPEG quality (1–100). Defaults to the saved setting.
    #[arg(short, long, value_name = "1-100", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Font file used when a layer's family is not installed.
    #[arg(short, long, value_name = "TTF")]
    pub font: Option<PathBuf>,

    /// Debug-level logging and per-step timing.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_crop(s: &str) -> std::result::Result<PixelRect, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{}': {}", p.trim(), e)))
        .collect::<std::result::Result<_, _>>()?;
    match parts[..] {
        [x, y, w, h] if w > 0.0 && h > 0.0 => Ok(PixelRect::new(x, y, w, h)),
        [_, _, _, _] => Err("crop width and height must be positive".to_string()),
        _ => Err(format!("expected x,y,width,height but got {} values", parts.len())),
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
/// `0` = thumbnail written, `1` = failure (reported on stderr).
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    let settings = EngineSettings::load();
    match run_inner(&args, &settings) {
        Ok(()) => {
            if args.verbose {
                println!(
                    "{} ({:.0}ms)",
                    args.output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &CliArgs, settings: &EngineSettings) -> Result<()> {
    let mut settings = settings.clone();
    if let Some(q) = args.quality {
        settings.jpeg_quality = q;
    }

    let mut document = Document::new();
    let mut background = io::load_file(&args.background)?.decode()?;
    info!("background {}x{}", background.width(), background.height());

    if let Some(rect) = args.crop {
        background = compositor::extract_crop(&background, rect, ScaleFactors::IDENTITY)?;
    }

    if let Some(path) = &args.subject {
        let subject = io::load_file(path)?;
        if !subject.has_alpha()? {
            return Err(ThumbError::resource_load(format!(
                "subject '{}' has no alpha channel",
                path.display()
            )));
        }
        background = compositor::composite_subject_on_background(
            &background,
            &subject.decode()?,
            settings.output_width,
            settings.output_height,
        )?;
    }
    document.set_background(EncodedImage::encode_png(&background)?);

    if let Some(path) = &args.layers {
        let layers = load_layers(path)?;
        info!("{} text layer(s)", layers.len());
        document.replace_all_layers(layers);
    }

    let mut fonts = FontBook::new(settings.font_dir.clone());
    if let Some(font) = &args.font {
        fonts = fonts.with_fallback_file(font)?;
    }

    let jpeg = compositor::export_jpeg(&document, &fonts, &settings)?;
    io::write_file(&args.output, &jpeg)?;
    info!("wrote {}", args.output.display());
    Ok(())
}

/// Read text layers from a JSON file: either `[TextSpec, ...]` or a design
/// object (`{"backgroundPrompt": ..., "textElements": [...]}`).
pub fn load_layers(path: &Path) -> Result<Vec<TextLayer>> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    if value.is_array() {
        let specs: Vec<TextSpec> = serde_json::from_value(value)?;
        Ok(specs.into_iter().map(TextLayer::from_spec).collect())
    } else {
        Ok(DesignSpec::from_value(&value)?.layers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_argument_parses() {
        assert_eq!(parse_crop("10, 20,300,200").unwrap(), PixelRect::new(10.0, 20.0, 300.0, 200.0));
        assert!(parse_crop("1,2,3").is_err());
        assert!(parse_crop("1,2,0,4").is_err());
        assert!(parse_crop("a,b,c,d").is_err());
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from([
            "ThumbFE", "-b", "bg.png", "-o", "out.jpg", "--crop", "0,0,10,10", "-q", "80",
        ])
        .unwrap();
        assert_eq!(args.quality, Some(80));
        assert!(args.crop.is_some());
        assert!(CliArgs::try_parse_from(["ThumbFE", "-b", "bg.png", "-o", "o.jpg", "-q", "0"]).is_err());
    }

    #[test]
    fn layers_file_accepts_array_or_design() {
        let dir = tempfile::tempdir().unwrap();
        let array = dir.path().join("layers.json");
        std::fs::write(
            &array,
            r##"[{"content":"A","color":"#fff","fontSize":50,"fontFamily":"Anton","top":1,"left":2}]"##,
        )
        .unwrap();
        assert_eq!(load_layers(&array).unwrap().len(), 1);

        let design = dir.path().join("design.json");
        std::fs::write(
            &design,
            r##"{"backgroundPrompt":"x","textElements":[
                {"content":"A","color":"#fff","fontSize":50,"fontFamily":"Anton","top":1,"left":2},
                {"content":"B","color":"#000","fontSize":40,"fontFamily":"Roboto","top":3,"left":4}]}"##,
        )
        .unwrap();
        let layers = load_layers(&design).unwrap();
        assert_eq!(layers[1].content, "B");
    }

    #[test]
    fn compose_without_text_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let bg_path = dir.path().join("bg.png");
        let bg = image::RgbaImage::from_pixel(64, 36, image::Rgba([30, 60, 90, 255]));
        io::write_file(&bg_path, &EncodedImage::encode_png(&bg).unwrap()).unwrap();

        let out = dir.path().join("thumb.jpg");
        let args = CliArgs::try_parse_from([
            "ThumbFE",
            "-b",
            bg_path.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--crop",
            "0,0,32,18",
        ])
        .unwrap();
        let settings = EngineSettings {
            output_width: 128,
            output_height: 72,
            ..EngineSettings::default()
        };
        run_inner(&args, &settings).unwrap();
        let written = io::load_file(&out).unwrap();
        assert_eq!(written.format(), image::ImageFormat::Jpeg);
        assert_eq!(written.decode().unwrap().dimensions(), (128, 72));
    }
}
