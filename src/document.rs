use std::fmt;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::geometry::{self, PercentRect, PixelRect};
use crate::io::EncodedImage;
use crate::mode::EditMode;
use crate::ops::mask::MaskEngine;

pub const DEFAULT_TEXT: &str = "Your Text Here";
pub const DEFAULT_FONT_SIZE: f32 = 80.0;
pub const DEFAULT_TOP: f32 = 40.0;
pub const DEFAULT_LEFT: f32 = 20.0;
pub const DEFAULT_OUTLINE_WIDTH: f32 = 5.0;
pub const DEFAULT_BRUSH_SIZE: f32 = 40.0;

/// Unique identifier of a text layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// HEX COLOR
// ============================================================================

/// An opaque sRGB color written as `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor([u8; 3]);

impl HexColor {
    pub const WHITE: HexColor = HexColor([255, 255, 255]);
    pub const BLACK: HexColor = HexColor([0, 0, 0]);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    pub fn to_rgba(&self) -> Rgba<u8> {
        Rgba([self.0[0], self.0[1], self.0[2], 255])
    }
}

impl FromStr for HexColor {
    type Err = String;

    /// Accepts `#rgb` or `#rrggbb`, either case, `#` optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{}' is not a hex color", s));
        }
        let channel = |i: usize, len: usize| u8::from_str_radix(&hex[i..i + len], 16);
        let parsed = match hex.len() {
            3 => [channel(0, 1), channel(1, 1), channel(2, 1)].map(|c| c.map(|v| v * 17)),
            6 => [channel(0, 2), channel(2, 2), channel(4, 2)],
            _ => return Err(format!("'{}' is not a hex color", s)),
        };
        match parsed {
            [Ok(r), Ok(g), Ok(b)] => Ok(Self([r, g, b])),
            _ => Err(format!("'{}' is not a hex color", s)),
        }
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HexColor> for String {
    fn from(c: HexColor) -> Self {
        c.to_string()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

// ============================================================================
// FONT FAMILY
// ============================================================================

/// The fixed set of display faces offered for text layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FontFamily {
    #[default]
    Impact,
    Anton,
    BebasNeue,
    Montserrat,
    Oswald,
    ArialBlack,
    Roboto,
}

impl FontFamily {
    pub const ALL: [FontFamily; 7] = [
        FontFamily::Impact,
        FontFamily::Anton,
        FontFamily::BebasNeue,
        FontFamily::Montserrat,
        FontFamily::Oswald,
        FontFamily::ArialBlack,
        FontFamily::Roboto,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FontFamily::Impact => "Impact",
            FontFamily::Anton => "Anton",
            FontFamily::BebasNeue => "Bebas Neue",
            FontFamily::Montserrat => "Montserrat",
            FontFamily::Oswald => "Oswald",
            FontFamily::ArialBlack => "Arial Black",
            FontFamily::Roboto => "Roboto",
        }
    }

    /// CSS weight used when asking the system for this face.
    pub fn weight(&self) -> u16 {
        match self {
            FontFamily::ArialBlack => 900,
            _ => 400,
        }
    }

    /// Match a family name, ignoring case, whitespace and any CSS fallback
    /// list after the first comma (`"Anton, sans-serif"`).
    pub fn from_name(name: &str) -> Option<Self> {
        let first = name.split(',').next().unwrap_or("");
        let key: String = first
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL.into_iter().find(|f| {
            let candidate: String = f
                .name()
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            candidate == key
        })
    }
}

impl From<String> for FontFamily {
    /// Unknown names fall back to the first family.
    fn from(name: String) -> Self {
        Self::from_name(&name).unwrap_or_else(|| {
            debug!("unknown font family '{}', using {}", name, FontFamily::default().name());
            FontFamily::default()
        })
    }
}

impl From<FontFamily> for String {
    fn from(f: FontFamily) -> Self {
        f.name().to_string()
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// TEXT LAYERS
// ============================================================================

/// One positioned, styled text overlay.
///
/// `top` and `left` are percentages of the background's display box.  The
/// model stores them as given; editing controls clamp.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayer {
    pub id: LayerId,
    pub content: String,
    pub color: HexColor,
    pub font_size: f32,
    pub font_family: FontFamily,
    pub top: f32,
    pub left: f32,
    pub outline_color: HexColor,
    /// 0 disables the outline entirely.
    pub outline_width: f32,
}

impl Default for TextLayer {
    fn default() -> Self {
        Self {
            id: LayerId::new(),
            content: DEFAULT_TEXT.to_string(),
            color: HexColor::WHITE,
            font_size: DEFAULT_FONT_SIZE,
            font_family: FontFamily::default(),
            top: DEFAULT_TOP,
            left: DEFAULT_LEFT,
            outline_color: HexColor::BLACK,
            outline_width: DEFAULT_OUTLINE_WIDTH,
        }
    }
}

impl TextLayer {
    /// A new layer (fresh id) from a design or file spec.
    pub fn from_spec(spec: TextSpec) -> Self {
        Self {
            id: LayerId::new(),
            content: spec.content,
            color: spec.color,
            font_size: spec.font_size,
            font_family: spec.font_family,
            top: spec.top,
            left: spec.left,
            outline_color: spec.outline_color,
            outline_width: spec.outline_width,
        }
    }

    pub fn to_spec(&self) -> TextSpec {
        TextSpec {
            content: self.content.clone(),
            color: self.color,
            font_size: self.font_size,
            font_family: self.font_family,
            top: self.top,
            left: self.left,
            outline_color: self.outline_color,
            outline_width: self.outline_width,
        }
    }
}

fn default_outline_color() -> HexColor {
    HexColor::BLACK
}

fn default_outline_width() -> f32 {
    DEFAULT_OUTLINE_WIDTH
}

/// A text layer without its id, as it appears in design responses and
/// layer files (camelCase keys).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpec {
    pub content: String,
    pub color: HexColor,
    pub font_size: f32,
    pub font_family: FontFamily,
    pub top: f32,
    pub left: f32,
    #[serde(default = "default_outline_color")]
    pub outline_color: HexColor,
    #[serde(default = "default_outline_width")]
    pub outline_width: f32,
}

/// Field-by-field update; `None` leaves the field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextLayerPatch {
    pub content: Option<String>,
    pub color: Option<HexColor>,
    pub font_size: Option<f32>,
    pub font_family: Option<FontFamily>,
    pub top: Option<f32>,
    pub left: Option<f32>,
    pub outline_color: Option<HexColor>,
    pub outline_width: Option<f32>,
}

impl TextLayerPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Move to `(left, top)` percent, clamped into the display box.
    pub fn position(left: f32, top: f32) -> Self {
        Self {
            left: Some(geometry::clamp_percent(left)),
            top: Some(geometry::clamp_percent(top)),
            ..Self::default()
        }
    }

    fn apply(self, layer: &mut TextLayer) {
        if let Some(v) = self.content {
            layer.content = v;
        }
        if let Some(v) = self.color {
            layer.color = v;
        }
        if let Some(v) = self.font_size {
            layer.font_size = v;
        }
        if let Some(v) = self.font_family {
            layer.font_family = v;
        }
        if let Some(v) = self.top {
            layer.top = v;
        }
        if let Some(v) = self.left {
            layer.left = v;
        }
        if let Some(v) = self.outline_color {
            layer.outline_color = v;
        }
        if let Some(v) = self.outline_width {
            layer.outline_width = v;
        }
    }
}

// ============================================================================
// CROP & RETOUCH STATE
// ============================================================================

/// Aspect constraint for the crop rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    #[default]
    Free,
    Widescreen,
    Standard,
    Square,
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Free,
        AspectRatio::Widescreen,
        AspectRatio::Standard,
        AspectRatio::Square,
        AspectRatio::Portrait,
    ];

    /// Width / height, or `None` when unconstrained.
    pub fn ratio(&self) -> Option<f32> {
        match self {
            AspectRatio::Free => None,
            AspectRatio::Widescreen => Some(16.0 / 9.0),
            AspectRatio::Standard => Some(4.0 / 3.0),
            AspectRatio::Square => Some(1.0),
            AspectRatio::Portrait => Some(9.0 / 16.0),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Free => "Free",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Standard => "4:3",
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "9:16",
        }
    }
}

/// Live crop rectangle (percent of the displayed image) plus the rectangle
/// completed on gesture release (display pixels).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CropState {
    pub rect: Option<PercentRect>,
    pub aspect: AspectRatio,
    pub completed: Option<PixelRect>,
}

impl CropState {
    /// Pick an aspect and recompute the rectangle for a `w × h` display.
    pub fn set_aspect(&mut self, aspect: AspectRatio, display_w: u32, display_h: u32) {
        self.aspect = aspect;
        self.recenter(display_w, display_h);
    }

    /// Re-center to the aspect's largest 90% rectangle (image load).  A free
    /// aspect leaves the rectangle alone.
    pub fn recenter(&mut self, display_w: u32, display_h: u32) {
        if let Some(ratio) = self.aspect.ratio() {
            let rect = geometry::aspect_centered_crop(ratio, display_w, display_h);
            self.rect = Some(rect);
            self.completed = Some(rect.to_pixels(display_w, display_h));
        }
    }

    pub fn drag(&mut self, rect: PercentRect) {
        self.rect = Some(rect);
    }

    pub fn complete(&mut self, rect: PixelRect) {
        self.completed = Some(rect);
    }

    /// Drop the rectangles; the aspect choice stays.
    pub fn clear(&mut self) {
        self.rect = None;
        self.completed = None;
    }
}

/// Retouch brush plus its mask.
#[derive(Clone, Debug)]
pub struct RetouchState {
    pub mask: MaskEngine,
    pub brush_size: f32,
}

impl Default for RetouchState {
    fn default() -> Self {
        Self {
            mask: MaskEngine::new(),
            brush_size: DEFAULT_BRUSH_SIZE,
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// The working thumbnail: background, ordered layers (first drawn first),
/// selection and edit state.
///
/// The selected id, when set, always names a layer in `layers`.
#[derive(Clone, Debug, Default)]
pub struct Document {
    background: Option<EncodedImage>,
    layers: Vec<TextLayer>,
    selected: Option<LayerId>,
    mode: EditMode,
    retouch: RetouchState,
    crop: CropState,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a default layer on top, select it and return its id.
    pub fn add_text_layer(&mut self) -> LayerId {
        let layer = TextLayer::default();
        let id = layer.id;
        self.layers.push(layer);
        self.selected = Some(id);
        id
    }

    /// Merge `patch` into the layer.  Unknown ids are ignored.
    pub fn update_text_layer(&mut self, id: LayerId, patch: TextLayerPatch) -> bool {
        match self.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                patch.apply(layer);
                true
            }
            None => {
                debug!("update ignored: no layer {}", id);
                false
            }
        }
    }

    /// Remove the layer, clearing the selection if it pointed at it.
    pub fn delete_text_layer(&mut self, id: LayerId) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        if self.layers.len() == before {
            debug!("delete ignored: no layer {}", id);
            return false;
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        true
    }

    /// Select a layer or clear the selection.  Unknown ids are ignored.
    pub fn select_layer(&mut self, id: Option<LayerId>) -> bool {
        match id {
            Some(id) if self.layer(id).is_none() => {
                debug!("select ignored: no layer {}", id);
                false
            }
            _ => {
                self.selected = id;
                true
            }
        }
    }

    pub fn set_background(&mut self, image: EncodedImage) {
        self.background = Some(image);
    }

    pub fn replace_all_layers(&mut self, layers: Vec<TextLayer>) {
        self.layers = layers;
        self.selected = None;
    }

    /// Back to the empty document in Text mode.
    pub fn reset(&mut self) {
        self.background = None;
        self.layers.clear();
        self.selected = None;
        self.retouch.mask.release();
        self.crop = CropState::default();
        self.mode = EditMode::Text;
    }

    pub fn set_mode(&mut self, mode: EditMode) {
        self.mode = mode;
    }

    pub fn background(&self) -> Option<&EncodedImage> {
        self.background.as_ref()
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    pub fn layers(&self) -> &[TextLayer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&TextLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn selected_id(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn selected_layer(&self) -> Option<&TextLayer> {
        self.selected.and_then(|id| self.layer(id))
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn crop(&self) -> &CropState {
        &self.crop
    }

    pub fn crop_mut(&mut self) -> &mut CropState {
        &mut self.crop
    }

    pub fn retouch(&self) -> &RetouchState {
        &self.retouch
    }

    pub fn retouch_mut(&mut self) -> &mut RetouchState {
        &mut self.retouch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection_is_valid(doc: &Document) -> bool {
        doc.selected_id().is_none_or(|id| doc.layer(id).is_some())
    }

    #[test]
    fn add_update_delete_scenario() {
        let mut doc = Document::new();
        let id = doc.add_text_layer();
        let layer = doc.layer(id).unwrap().clone();
        assert_eq!(layer.content, "Your Text Here");
        assert_eq!(layer.font_size, 80.0);
        assert_eq!((layer.top, layer.left), (40.0, 20.0));
        assert_eq!(layer.font_family, FontFamily::Impact);
        assert_eq!(doc.selected_id(), Some(id));

        let patch = TextLayerPatch {
            font_size: Some(120.0),
            ..TextLayerPatch::default()
        };
        assert!(doc.update_text_layer(id, patch));
        let updated = doc.layer(id).unwrap();
        assert_eq!(updated.font_size, 120.0);
        assert_eq!(
            TextLayer {
                font_size: 80.0,
                ..updated.clone()
            },
            layer
        );

        assert!(doc.delete_text_layer(id));
        assert!(doc.layers().is_empty());
        assert_eq!(doc.selected_id(), None);
    }

    #[test]
    fn selection_invariant_holds_through_add_delete() {
        let mut doc = Document::new();
        let mut ids = Vec::new();
        for step in 0..24 {
            if step % 3 == 2 {
                let victim = ids.remove((step * 7) % ids.len());
                doc.delete_text_layer(victim);
            } else {
                ids.push(doc.add_text_layer());
                if step % 4 == 0 {
                    doc.select_layer(Some(ids[0]));
                }
            }
            assert!(selection_is_valid(&doc), "step {}", step);
        }
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut doc = Document::new();
        let id = doc.add_text_layer();
        let stranger = LayerId::new();
        assert!(!doc.update_text_layer(stranger, TextLayerPatch::position(0.0, 0.0)));
        assert!(!doc.delete_text_layer(stranger));
        assert!(!doc.select_layer(Some(stranger)));
        assert_eq!(doc.selected_id(), Some(id));
        assert!(doc.select_layer(None));
        assert_eq!(doc.selected_id(), None);
    }

    #[test]
    fn deleting_unselected_layer_keeps_selection() {
        let mut doc = Document::new();
        let a = doc.add_text_layer();
        let b = doc.add_text_layer();
        assert_eq!(doc.selected_id(), Some(b));
        doc.delete_text_layer(a);
        assert_eq!(doc.selected_id(), Some(b));
    }

    #[test]
    fn replace_all_layers_drops_selection() {
        let mut doc = Document::new();
        doc.add_text_layer();
        doc.replace_all_layers(vec![TextLayer::default(), TextLayer::default()]);
        assert_eq!(doc.layers().len(), 2);
        assert_eq!(doc.selected_id(), None);
    }

    #[test]
    fn reset_returns_to_text_mode() {
        let mut doc = Document::new();
        doc.add_text_layer();
        doc.set_mode(EditMode::Crop);
        doc.crop_mut().complete(PixelRect::new(0.0, 0.0, 10.0, 10.0));
        doc.reset();
        assert_eq!(doc.mode(), EditMode::Text);
        assert!(doc.layers().is_empty());
        assert!(doc.crop().completed.is_none());
        assert!(!doc.has_background());
    }

    #[test]
    fn set_mode_keeps_crop_data() {
        let mut doc = Document::new();
        doc.set_mode(EditMode::Crop);
        doc.crop_mut().complete(PixelRect::new(1.0, 2.0, 3.0, 4.0));
        doc.set_mode(EditMode::Text);
        assert!(doc.crop().completed.is_some());
    }

    #[test]
    fn hex_colors_parse_and_format() {
        assert_eq!("#FFF".parse::<HexColor>().unwrap(), HexColor::WHITE);
        assert_eq!("1a2B3c".parse::<HexColor>().unwrap().to_string(), "#1a2b3c");
        assert!("#12345".parse::<HexColor>().is_err());
        assert!("#gggggg".parse::<HexColor>().is_err());
        assert_eq!(HexColor::rgb(255, 0, 0).to_rgba(), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn font_names_match_loosely_and_fall_back() {
        assert_eq!(FontFamily::from_name("bebas neue"), Some(FontFamily::BebasNeue));
        assert_eq!(FontFamily::from_name("'Anton', sans-serif"), Some(FontFamily::Anton));
        assert_eq!(FontFamily::from("Comic Sans".to_string()), FontFamily::Impact);
    }

    #[test]
    fn text_spec_uses_camel_case() {
        let json = r##"{"content":"GO","color":"#ff0000","fontSize":64,"fontFamily":"Oswald","top":10,"left":5}"##;
        let spec: TextSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.font_family, FontFamily::Oswald);
        assert_eq!(spec.outline_width, DEFAULT_OUTLINE_WIDTH);
        let layer = TextLayer::from_spec(spec.clone());
        assert_eq!(layer.to_spec(), spec);
        let out = serde_json::to_value(&spec).unwrap();
        assert_eq!(out["fontSize"], 64.0);
        assert_eq!(out["outlineColor"], "#000000");
    }

    #[test]
    fn aspect_selection_recenters_crop() {
        let mut crop = CropState::default();
        crop.set_aspect(AspectRatio::Square, 200, 100);
        let rect = crop.rect.unwrap().to_pixels(200, 100);
        assert!((rect.width - 90.0).abs() < 1e-3);
        assert!((rect.height - 90.0).abs() < 1e-3);
        assert!(crop.completed.is_some());

        let mut free = CropState::default();
        free.set_aspect(AspectRatio::Free, 200, 100);
        assert!(free.rect.is_none());
    }
}
