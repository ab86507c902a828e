#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use image::{Rgba, RgbaImage};
use serde_json::{Value, json};

use thumbfe::canvas::{Coverage, Region};
use thumbfe::ops::text::GlyphSource;
use thumbfe::{EncodedImage, EngineSettings, Editor, FontFamily, GenerationGateway, Result, ThumbError};

/// Each character is a solid block half as wide as the font size.
pub struct BlockGlyphs;

impl GlyphSource for BlockGlyphs {
    fn rasterize(
        &self,
        text: &str,
        _family: FontFamily,
        font_size: f32,
        origin: (f32, f32),
        clip: Region,
    ) -> Result<Coverage> {
        let w = (text.chars().count() as f32 * font_size * 0.5).round() as u32;
        let h = font_size.round() as u32;
        let mut c = Coverage::new(w, h, origin.0.round() as i32, origin.1.round() as i32);
        c.buf.fill(1.0);
        Ok(c.clipped(clip))
    }
}

pub fn color_for(prompt: &str) -> Rgba<u8> {
    match prompt {
        "red" => Rgba([220, 20, 20, 255]),
        "blue" => Rgba([20, 20, 220, 255]),
        "green" => Rgba([20, 200, 20, 255]),
        _ => Rgba([128, 128, 128, 255]),
    }
}

pub fn png(w: u32, h: u32, color: Rgba<u8>) -> EncodedImage {
    EncodedImage::encode_png(&RgbaImage::from_pixel(w, h, color)).unwrap()
}

struct Gate {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

/// In-process gateway: images are solid colors chosen by prompt.
#[derive(Default)]
pub struct FakeGateway {
    pub fail_generate: AtomicBool,
    pub panic_generate: AtomicBool,
    pub fail_cutout: AtomicBool,
    pub cutout_without_alpha: AtomicBool,
    pub design: Mutex<Option<Value>>,
    pub edit_inputs: Mutex<Vec<EncodedImage>>,
    pub finished: AtomicUsize,
    gate: Mutex<Option<Gate>>,
}

impl FakeGateway {
    /// The next `generate_image` call signals `entered` and then blocks
    /// until `release` fires.
    pub fn install_gate(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    fn hold(&self) {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
    }
}

impl GenerationGateway for FakeGateway {
    fn generate_image(&self, prompt: &str) -> Result<EncodedImage> {
        self.hold();
        if self.panic_generate.load(Ordering::SeqCst) {
            panic!("image backend crashed");
        }
        let result = if self.fail_generate.load(Ordering::SeqCst) {
            Err(ThumbError::generation("no images returned"))
        } else {
            Ok(png(64, 36, color_for(prompt)))
        };
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn edit_image(&self, image: &EncodedImage, prompt: &str) -> Result<EncodedImage> {
        self.edit_inputs.lock().unwrap().push(image.clone());
        let (w, h) = image.decode()?.dimensions();
        Ok(png(w, h, color_for(prompt)))
    }

    fn create_thumbnail_from_image(&self, image: &EncodedImage, prompt: &str) -> Result<EncodedImage> {
        let (w, h) = image.decode()?.dimensions();
        Ok(png(w, h, color_for(prompt)))
    }

    fn remove_image_background(&self, image: &EncodedImage) -> Result<EncodedImage> {
        if self.fail_cutout.load(Ordering::SeqCst) {
            return Err(ThumbError::generation("subject isolation failed"));
        }
        let pixels = image.decode()?;
        if self.cutout_without_alpha.load(Ordering::SeqCst) {
            return EncodedImage::encode_jpeg(&pixels, 90);
        }
        let (w, h) = pixels.dimensions();
        let cutout = RgbaImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                Rgba([0, 0, 0, 0])
            } else {
                *pixels.get_pixel(x, 0)
            }
        });
        EncodedImage::encode_png(&cutout)
    }

    fn get_thumbnail_design(&self, topic: &str, main_text: &str, _secondary_text: Option<&str>) -> Result<Value> {
        if let Some(v) = self.design.lock().unwrap().clone() {
            return Ok(v);
        }
        Ok(json!({
            "backgroundPrompt": "green",
            "textElements": [
                {"content": main_text, "color": "#ffffff", "fontSize": 90, "fontFamily": "Anton",
                 "top": 10, "left": 5, "outlineColor": "#000000", "outlineWidth": 6},
                {"content": topic, "color": "#ffcc00", "fontSize": 40, "fontFamily": "Roboto",
                 "top": 70, "left": 5}
            ]
        }))
    }
}

pub fn small_settings() -> EngineSettings {
    EngineSettings {
        output_width: 128,
        output_height: 72,
        ..EngineSettings::default()
    }
}

pub fn editor() -> (Editor, Arc<FakeGateway>) {
    // a small pool: parked gateway calls must never need one of its threads
    let _ = rayon::ThreadPoolBuilder::new().num_threads(2).build_global();
    let gateway = Arc::new(FakeGateway::default());
    let editor = Editor::new(gateway.clone(), Arc::new(BlockGlyphs), small_settings());
    (editor, gateway)
}
