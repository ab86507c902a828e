// ============================================================================
// GENERATION GATEWAY - contract with the remote image backend
// ============================================================================
//
// The engine never talks to a model directly.  Front ends hand the editor an
// implementation of `GenerationGateway`; calls run on worker threads, so
// implementations must be `Send + Sync`.

use serde_json::Value;

use crate::document::{TextLayer, TextSpec};
use crate::error::{Result, ThumbError};
use crate::io::EncodedImage;

/// Remote image synthesis and editing.
pub trait GenerationGateway: Send + Sync {
    /// Text-to-image, 16:9, one image.  `Generation` error when the
    /// provider returns nothing (safety filter, policy) or the call fails.
    fn generate_image(&self, prompt: &str) -> Result<EncodedImage>;

    /// Fill the transparent region of `image` per `prompt`, leaving opaque
    /// pixels alone.  `Edit` error when no image comes back.
    fn edit_image(&self, image: &EncodedImage, prompt: &str) -> Result<EncodedImage>;

    /// Whole-image transform guided by `prompt`.
    fn create_thumbnail_from_image(&self, image: &EncodedImage, prompt: &str) -> Result<EncodedImage>;

    /// Isolate the subject; everything else transparent.  The result must
    /// carry an alpha channel.
    fn remove_image_background(&self, image: &EncodedImage) -> Result<EncodedImage>;

    /// Raw structured layout plan; validate with [`DesignSpec::from_value`].
    fn get_thumbnail_design(&self, topic: &str, main_text: &str, secondary_text: Option<&str>) -> Result<Value>;
}

/// A validated layout plan: a prompt for the background plus text elements.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignSpec {
    pub background_prompt: String,
    pub text_elements: Vec<TextSpec>,
}

impl DesignSpec {
    /// Validate an untrusted response.  Requires a non-empty
    /// `backgroundPrompt` string and a `textElements` array whose entries
    /// all parse as text specs.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ThumbError::design_format("design response is not an object"))?;

        let background_prompt = obj
            .get("backgroundPrompt")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ThumbError::design_format("missing or empty backgroundPrompt"))?
            .to_string();

        let elements = obj
            .get("textElements")
            .and_then(Value::as_array)
            .ok_or_else(|| ThumbError::design_format("textElements is not an array"))?;

        let text_elements = elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                serde_json::from_value::<TextSpec>(el.clone())
                    .map_err(|e| ThumbError::design_format(format!("textElements[{}]: {}", i, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            background_prompt,
            text_elements,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Fresh layers (new ids) for every text element, in order.
    pub fn layers(&self) -> Vec<TextLayer> {
        self.text_elements.iter().cloned().map(TextLayer::from_spec).collect()
    }
}
