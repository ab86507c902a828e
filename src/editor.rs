// ============================================================================
// EDITOR - owns the document and runs gateway requests off-thread
// ============================================================================
//
// Requests run on their own worker thread with a snapshot of their inputs
// and report back over an mpsc channel.  Gateway calls block on the network,
// so they stay off the rayon pool, which is left to the pixel loops.  The
// caller drains the channel with `poll()` (or blocks in `wait()`); only then
// is the document touched, all at once.
// Every request carries a token; anything that arrives under an old token
// (after "start over") is dropped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::document::{AspectRatio, Document, LayerId, TextLayer, TextLayerPatch};
use crate::error::{Result, ThumbError};
use crate::gateway::{DesignSpec, GenerationGateway};
use crate::geometry::{self, PercentRect, PixelRect, ScaleFactors};
use crate::io::{self, EncodedImage};
use crate::mode::{EditMode, Gesture};
use crate::ops::compositor;
use crate::ops::text::GlyphSource;

/// Identifies one submitted request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobToken(u64);

/// A remote-generation flow the user can start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// New background from a text prompt.
    Generate { prompt: String },
    /// Restyle the current background as a whole.
    Transform { prompt: String },
    /// Keep the current subject, generate a new scene behind it.
    ReplaceBackground { prompt: String },
    /// Masked edit of the brushed region.
    Retouch { prompt: String },
    /// Full layout plan: background plus text layers.
    Design {
        topic: String,
        main_text: String,
        secondary_text: Option<String>,
    },
}

impl Request {
    pub fn description(&self) -> &'static str {
        match self {
            Request::Generate { .. } => "Generate background",
            Request::Transform { .. } => "Transform image",
            Request::ReplaceBackground { .. } => "Replace background",
            Request::Retouch { .. } => "Retouch",
            Request::Design { .. } => "Design thumbnail",
        }
    }

    fn panic_error(&self, msg: String) -> ThumbError {
        match self {
            Request::Retouch { .. } => ThumbError::edit(msg),
            _ => ThumbError::generation(msg),
        }
    }
}

/// A failed flow, shown until dismissed or retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorNotice {
    pub message: String,
    pub request: Option<Request>,
}

/// What `poll()` / `wait()` observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Applied(Request),
    Failed(ErrorNotice),
}

enum Outcome {
    Background(EncodedImage),
    Retouched(EncodedImage),
    Design {
        background: EncodedImage,
        layers: Vec<TextLayer>,
    },
}

struct JobResult {
    token: u64,
    outcome: Result<Outcome>,
}

type Job = Box<dyn FnOnce() -> Result<Outcome> + Send + 'static>;

pub struct Editor {
    document: Document,
    settings: EngineSettings,
    gateway: Arc<dyn GenerationGateway>,
    glyphs: Arc<dyn GlyphSource>,
    job_sender: mpsc::Sender<JobResult>,
    job_receiver: mpsc::Receiver<JobResult>,
    job_token: u64,
    busy: bool,
    pending: Option<Request>,
    error: Option<ErrorNotice>,
    display_size: Option<(u32, u32)>,
}

impl Editor {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        glyphs: Arc<dyn GlyphSource>,
        settings: EngineSettings,
    ) -> Self {
        let (job_sender, job_receiver) = mpsc::channel();
        let mut document = Document::new();
        document.retouch_mut().brush_size = settings.brush_size;
        Self {
            document,
            settings,
            gateway,
            glyphs,
            job_sender,
            job_receiver,
            job_token: 1,
            busy: false,
            pending: None,
            error: None,
            display_size: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn pending_request(&self) -> Option<&Request> {
        self.pending.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorNotice> {
        self.error.as_ref()
    }

    pub fn current_token(&self) -> JobToken {
        JobToken(self.job_token)
    }

    // ------------------------------------------------------------------------
    // Remote flows
    // ------------------------------------------------------------------------

    /// Start a remote flow.  Rejected with `Busy` while another is in
    /// flight; precondition failures leave all state untouched.
    pub fn submit(&mut self, request: Request) -> Result<JobToken> {
        if self.busy {
            return Err(ThumbError::Busy);
        }
        let job = self.build_job(&request)?;
        self.spawn_job(request, job)
    }

    fn build_job(&self, request: &Request) -> Result<Job> {
        let gateway = Arc::clone(&self.gateway);
        let job: Job = match request.clone() {
            Request::Generate { prompt } => Box::new(move || {
                let image = gateway.generate_image(&prompt)?;
                Ok(Outcome::Background(validated(image)?))
            }),
            Request::Transform { prompt } => {
                let source = self.require_background()?;
                Box::new(move || {
                    let image = gateway.create_thumbnail_from_image(&source, &prompt)?;
                    Ok(Outcome::Background(validated(image)?))
                })
            }
            Request::ReplaceBackground { prompt } => {
                let source = self.require_background()?;
                let (out_w, out_h) = (self.settings.output_width, self.settings.output_height);
                Box::new(move || {
                    let composite = replace_background(gateway.as_ref(), &source, &prompt, out_w, out_h)?;
                    Ok(Outcome::Background(EncodedImage::encode_png(&composite)?))
                })
            }
            Request::Retouch { prompt } => {
                let source = self.require_background()?;
                let mask = match self.document.retouch().mask.mask() {
                    Some(mask) if mask.has_marked_pixels() => mask.clone(),
                    _ => return Err(ThumbError::NoMask),
                };
                Box::new(move || {
                    let pixels = source.decode()?;
                    let holed = compositor::apply_mask_removal(&pixels, &mask)?;
                    let upload = EncodedImage::encode_png(&holed)?;
                    let image = gateway.edit_image(&upload, &prompt)?;
                    Ok(Outcome::Retouched(validated(image)?))
                })
            }
            Request::Design {
                topic,
                main_text,
                secondary_text,
            } => Box::new(move || {
                let raw = gateway.get_thumbnail_design(&topic, &main_text, secondary_text.as_deref())?;
                let design = DesignSpec::from_value(&raw)?;
                let image = gateway.generate_image(&design.background_prompt)?;
                Ok(Outcome::Design {
                    background: validated(image)?,
                    layers: design.layers(),
                })
            }),
        };
        Ok(job)
    }

    fn require_background(&self) -> Result<EncodedImage> {
        self.document.background().cloned().ok_or(ThumbError::NoBackground)
    }

    /// Run `job` on a dedicated worker thread under a fresh token.  Panics
    /// inside the job come back as an error for that request.  A stale job
    /// keeps only its own thread, never a slot a newer request needs.
    fn spawn_job(&mut self, request: Request, job: Job) -> Result<JobToken> {
        let token = self.job_token.wrapping_add(1);
        let sender = self.job_sender.clone();
        let worker_request = request.clone();
        std::thread::Builder::new()
            .name(format!("thumbfe-job-{}", token))
            .spawn(move || {
                let request = worker_request;
                let outcome = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
                    Ok(outcome) => outcome,
                    Err(panic_info) => {
                        let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic_info.downcast_ref::<String>() {
                            s.to_string()
                        } else {
                            "unknown panic payload".to_string()
                        };
                        Err(request.panic_error(format!("{} panicked: {}", request.description(), msg)))
                    }
                };
                let _ = sender.send(JobResult { token, outcome });
            })?;

        self.job_token = token;
        self.busy = true;
        self.error = None;
        self.pending = Some(request.clone());
        info!("{} started (token {})", request.description(), token);
        Ok(JobToken(token))
    }

    /// Drain finished jobs and apply the current one, if it is done.
    pub fn poll(&mut self) -> Option<Completion> {
        let mut last = None;
        while let Ok(result) = self.job_receiver.try_recv() {
            if let Some(done) = self.finish(result) {
                last = Some(done);
            }
        }
        last
    }

    /// Block until the in-flight request completes or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        while self.busy {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.job_receiver.recv_timeout(remaining) {
                Ok(result) => {
                    if let Some(done) = self.finish(result) {
                        return Some(done);
                    }
                }
                Err(_) => return None,
            }
        }
        None
    }

    fn finish(&mut self, result: JobResult) -> Option<Completion> {
        if result.token != self.job_token {
            warn!("discarding stale response (token {}, current {})", result.token, self.job_token);
            return None;
        }
        self.busy = false;
        let request = self.pending.take()?;

        match result.outcome {
            Ok(outcome) => {
                self.apply(outcome);
                info!("{} applied", request.description());
                Some(Completion::Applied(request))
            }
            Err(e) => {
                warn!("{} failed: {}", request.description(), e);
                let notice = ErrorNotice {
                    message: e.to_string(),
                    request: Some(request),
                };
                self.error = Some(notice.clone());
                Some(Completion::Failed(notice))
            }
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Background(image) => self.document.set_background(image),
            Outcome::Retouched(image) => {
                self.document.set_background(image);
                self.document.retouch_mut().mask.clear();
            }
            Outcome::Design { background, layers } => {
                self.document.set_background(background);
                self.document.replace_all_layers(layers);
            }
        }
        self.document.set_mode(EditMode::Text);
        self.recenter_crop();
    }

    /// Resubmit the request behind the current error notice.
    pub fn retry(&mut self) -> Result<Option<JobToken>> {
        let Some(request) = self.error.as_ref().and_then(|n| n.request.clone()) else {
            return Ok(None);
        };
        self.submit(request).map(Some)
    }

    /// Hide the error.  With no background yet this returns to the start state.
    pub fn dismiss_error(&mut self) {
        self.error = None;
        if !self.document.has_background() {
            self.document.reset();
        }
    }

    /// Reset everything.  Whatever is still in flight becomes stale.
    pub fn start_over(&mut self) {
        self.job_token = self.job_token.wrapping_add(1);
        self.busy = false;
        self.pending = None;
        self.error = None;
        self.document.reset();
        info!("start over");
    }

    // ------------------------------------------------------------------------
    // Local image changes
    // ------------------------------------------------------------------------

    /// Use uploaded file bytes as the background.
    pub fn upload_background(&mut self, bytes: Vec<u8>) -> Result<()> {
        if self.busy {
            return Err(ThumbError::Busy);
        }
        let image = validated(EncodedImage::from_bytes(bytes)?)?;
        self.document.set_background(image);
        self.document.set_mode(EditMode::Text);
        self.recenter_crop();
        Ok(())
    }

    pub fn upload_file(&mut self, path: &Path) -> Result<()> {
        let image = io::load_file(path)?;
        self.upload_background(image.bytes().to_vec())
    }

    /// Cut the completed crop rectangle out of the background.
    pub fn apply_crop(&mut self) -> Result<()> {
        if self.busy {
            return Err(ThumbError::Busy);
        }
        let background = self.require_background()?;
        let rect = self
            .document
            .crop()
            .completed
            .ok_or_else(|| ThumbError::invalid_crop("no completed crop rectangle"))?;
        let pixels = background.decode()?;
        let display = self.display_size.unwrap_or(pixels.dimensions());
        let scale = ScaleFactors::between(pixels.dimensions(), display);
        let cropped = compositor::extract_crop(&pixels, rect, scale)?;
        let encoded = EncodedImage::encode_png(&cropped)?;

        info!("cropped to {}x{}", cropped.width(), cropped.height());
        self.document.set_background(encoded);
        self.document.crop_mut().clear();
        self.document.set_mode(EditMode::Text);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Modes and gestures
    // ------------------------------------------------------------------------

    fn permits(&self, gesture: Gesture) -> bool {
        let ok = self.document.mode().permits(gesture, self.busy);
        if !ok {
            debug!("{:?} ignored in {} mode (busy: {})", gesture, self.document.mode(), self.busy);
        }
        ok
    }

    /// Switch modes.  Entering Retouch sizes the overlay; entering Crop
    /// starts from an empty (or aspect-centered) rectangle.
    pub fn set_mode(&mut self, mode: EditMode) -> Result<bool> {
        if self.busy {
            return Ok(false);
        }
        match mode {
            EditMode::Retouch => {
                if let Some((w, h)) = self.display_size {
                    self.document.retouch_mut().mask.resize(w, h)?;
                }
            }
            EditMode::Crop => {
                self.document.crop_mut().clear();
                self.recenter_crop();
            }
            EditMode::Text => {}
        }
        self.document.set_mode(mode);
        Ok(true)
    }

    /// The background's on-screen size changed.  In Retouch mode this
    /// resizes the overlay, which drops strokes painted so far.
    pub fn set_display_size(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(ThumbError::canvas_unavailable(format!(
                "display area {}x{} is empty",
                width, height
            )));
        }
        if self.document.mode() == EditMode::Retouch {
            self.document.retouch_mut().mask.resize(width, height)?;
        }
        self.display_size = Some((width, height));
        Ok(())
    }

    pub fn display_size(&self) -> Option<(u32, u32)> {
        self.display_size
    }

    pub fn set_brush_size(&mut self, size: f32) {
        self.document.retouch_mut().brush_size = size.max(1.0);
    }

    /// Start a brush stroke at an overlay-space point.
    pub fn pointer_down(&mut self, x: f32, y: f32) -> bool {
        if !self.permits(Gesture::BrushStroke) {
            return false;
        }
        let retouch = self.document.retouch_mut();
        let diameter = retouch.brush_size;
        retouch.mask.begin_stroke();
        retouch.mask.paint_at((x, y), diameter)
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> bool {
        if !self.permits(Gesture::BrushStroke) {
            return false;
        }
        let retouch = self.document.retouch_mut();
        let diameter = retouch.brush_size;
        retouch.mask.paint_at((x, y), diameter)
    }

    /// Finish the stroke; returns whether a usable mask now exists.
    pub fn pointer_up(&mut self) -> bool {
        let mask = &mut self.document.retouch_mut().mask;
        if !mask.is_stroking() {
            return false;
        }
        mask.end_stroke().is_some_and(|m| m.has_marked_pixels())
    }

    /// Whether "apply retouch" is available.
    pub fn can_retouch(&self) -> bool {
        !self.busy && self.document.has_background() && self.document.retouch().mask.has_mask()
    }

    pub fn clear_mask(&mut self) {
        self.document.retouch_mut().mask.clear();
    }

    /// Live crop rectangle while dragging (percent of the displayed image).
    pub fn drag_crop(&mut self, rect: PercentRect) -> bool {
        if !self.permits(Gesture::CropDrag) {
            return false;
        }
        self.document.crop_mut().drag(rect);
        true
    }

    /// Crop rectangle at gesture release (display pixels).
    pub fn complete_crop(&mut self, rect: PixelRect) -> bool {
        if !self.permits(Gesture::CropComplete) {
            return false;
        }
        self.document.crop_mut().complete(rect);
        true
    }

    pub fn set_aspect(&mut self, aspect: AspectRatio) {
        let (w, h) = self.crop_box();
        self.document.crop_mut().set_aspect(aspect, w, h);
    }

    fn crop_box(&self) -> (u32, u32) {
        self.display_size
            .or_else(|| {
                let bg = self.document.background()?;
                bg.dimensions().ok()
            })
            .unwrap_or((0, 0))
    }

    fn recenter_crop(&mut self) {
        if self.document.crop().aspect.ratio().is_none() {
            return;
        }
        let (w, h) = self.crop_box();
        self.document.crop_mut().recenter(w, h);
    }

    // ------------------------------------------------------------------------
    // Text layers
    // ------------------------------------------------------------------------

    pub fn add_text_layer(&mut self) -> Option<LayerId> {
        if !self.permits(Gesture::EditLayer) {
            return None;
        }
        Some(self.document.add_text_layer())
    }

    pub fn select_layer(&mut self, id: Option<LayerId>) -> bool {
        self.permits(Gesture::SelectLayer) && self.document.select_layer(id)
    }

    /// Drag a layer to `(left, top)` percent; clamped into the display box.
    pub fn move_layer(&mut self, id: LayerId, left: f32, top: f32) -> bool {
        self.permits(Gesture::MoveLayer) && self.document.update_text_layer(id, TextLayerPatch::position(left, top))
    }

    /// Drag by a display-pixel delta.
    pub fn drag_layer_by(&mut self, id: LayerId, dx: f32, dy: f32) -> bool {
        let Some((w, h)) = self.display_size else {
            return false;
        };
        let Some(layer) = self.document.layer(id) else {
            return false;
        };
        let (dl, dt) = geometry::pixels_to_percent(dx, dy, w, h);
        let (left, top) = (layer.left + dl, layer.top + dt);
        self.move_layer(id, left, top)
    }

    pub fn update_layer(&mut self, id: LayerId, patch: TextLayerPatch) -> bool {
        self.permits(Gesture::EditLayer) && self.document.update_text_layer(id, patch)
    }

    pub fn delete_layer(&mut self, id: LayerId) -> bool {
        self.permits(Gesture::EditLayer) && self.document.delete_text_layer(id)
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// What the editor shows at the current display size.
    pub fn preview(&self) -> Result<RgbaImage> {
        let (w, h) = self.crop_box();
        compositor::render_preview(&self.document, self.glyphs.as_ref(), w, h)
    }

    /// The flattened thumbnail as JPEG.
    pub fn export(&self) -> Result<EncodedImage> {
        compositor::export_jpeg(&self.document, self.glyphs.as_ref(), &self.settings)
    }

    /// Export into `dir` under the configured file name.
    pub fn export_to(&self, dir: &Path) -> Result<PathBuf> {
        let jpeg = self.export()?;
        let path = dir.join(&self.settings.export_file_name);
        io::write_file(&path, &jpeg)?;
        info!("exported {}", path.display());
        Ok(path)
    }
}

/// Decode once so nothing undecodable reaches the document.
fn validated(image: EncodedImage) -> Result<EncodedImage> {
    image.decode()?;
    Ok(image)
}

/// Cut the subject out of `source` and generate a new scene for it, in
/// parallel; both halves must succeed and decode before anything is drawn.
fn replace_background(
    gateway: &dyn GenerationGateway,
    source: &EncodedImage,
    prompt: &str,
    out_w: u32,
    out_h: u32,
) -> Result<RgbaImage> {
    // both calls wait on the network; run them side by side
    let (subject, scene) = std::thread::scope(|scope| {
        let cutout = scope.spawn(|| -> Result<RgbaImage> {
            let cutout = gateway.remove_image_background(source)?;
            if !cutout.has_alpha()? {
                return Err(ThumbError::generation("background removal returned an image without alpha"));
            }
            cutout.decode()
        });
        let scene = gateway.generate_image(prompt).and_then(|image| image.decode());
        let subject = cutout.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (subject, scene)
    });
    compositor::composite_subject_on_background(&scene?, &subject?, out_w, out_h)
}
