use thiserror::Error;

/// Every failure the engine can surface.
///
/// The first five variants are the user-facing taxonomy: remote generation,
/// remote masked edit, malformed design response, local image decode, and a
/// drawing surface that could not be allocated. The rest cover local
/// preconditions and ambient I/O.
#[derive(Debug, Error)]
pub enum ThumbError {
    #[error("Image generation failed: {0}")]
    Generation(String),

    #[error("Image edit failed: {0}")]
    Edit(String),

    #[error("Malformed design response: {0}")]
    DesignFormat(String),

    #[error("Failed to load image: {0}")]
    ResourceLoad(String),

    #[error("Drawing surface unavailable: {0}")]
    CanvasUnavailable(String),

    #[error("Invalid crop: {0}")]
    InvalidCrop(String),

    #[error("Font unavailable: {0}")]
    FontUnavailable(String),

    #[error("Another request is already in progress")]
    Busy,

    #[error("No background image")]
    NoBackground,

    #[error("No region marked for retouch")]
    NoMask,

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates factory methods for [`ThumbError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl ThumbError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a generation error.
    generation => Generation,
    /// Create an edit error.
    edit => Edit,
    /// Create a design format error.
    design_format => DesignFormat,
    /// Create a resource load error.
    resource_load => ResourceLoad,
    /// Create a canvas-unavailable error.
    canvas_unavailable => CanvasUnavailable,
    /// Create an invalid crop error.
    invalid_crop => InvalidCrop,
    /// Create a font-unavailable error.
    font_unavailable => FontUnavailable,
    /// Create an encode error.
    encode => Encode,
    /// Create a configuration error.
    config => Config,
}

impl ThumbError {
    /// True for failures that came back from the generation gateway.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ThumbError::Generation(_) | ThumbError::Edit(_) | ThumbError::DesignFormat(_)
        )
    }
}

impl From<image::ImageError> for ThumbError {
    fn from(e: image::ImageError) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<serde_json::Error> for ThumbError {
    fn from(e: serde_json::Error) -> Self {
        Self::DesignFormat(e.to_string())
    }
}

impl From<toml::de::Error> for ThumbError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for ThumbError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<base64::DecodeError> for ThumbError {
    fn from(e: base64::DecodeError) -> Self {
        Self::ResourceLoad(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThumbError>;
