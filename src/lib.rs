//! ThumbFE - thumbnail compositing and editing engine.
//!
//! A [`document::Document`] holds the background and text layers; the
//! [`editor::Editor`] drives it, sending remote generation work to a
//! [`gateway::GenerationGateway`] on worker threads and applying results
//! atomically.  [`ops::compositor`] turns a document into the exported JPEG.

pub mod canvas;
pub mod cli;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod gateway;
pub mod geometry;
pub mod io;
pub mod logger;
pub mod mode;
pub mod ops;

pub use config::EngineSettings;
pub use document::{Document, FontFamily, HexColor, LayerId, TextLayer, TextLayerPatch, TextSpec};
pub use editor::{Completion, Editor, ErrorNotice, JobToken, Request};
pub use error::{Result, ThumbError};
pub use gateway::{DesignSpec, GenerationGateway};
pub use io::EncodedImage;
pub use mode::{EditMode, Gesture};
