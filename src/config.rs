use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::io::DEFAULT_JPEG_QUALITY;
use crate::ops::compositor::{OUTPUT_HEIGHT, OUTPUT_WIDTH};

const SETTINGS_FILE: &str = "thumbfe_settings.toml";

/// Persisted engine settings.  Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub output_width: u32,
    pub output_height: u32,
    /// JPEG export quality, 1–100.
    pub jpeg_quality: u8,
    /// Retouch brush diameter in display pixels.
    pub brush_size: f32,
    pub export_file_name: String,
    /// Searched for `<Family>.ttf` / `.otf` before system fonts.
    pub font_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            output_width: OUTPUT_WIDTH,
            output_height: OUTPUT_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            brush_size: 40.0,
            export_file_name: "thumbnail.jpg".to_string(),
            font_dir: None,
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/thumbfe/thumbfe_settings.toml  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\ThumbFE\thumbfe_settings.toml
    /// On macOS:   ~/Library/Application Support/ThumbFE/thumbfe_settings.toml
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("thumbfe");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("ThumbFE").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("ThumbFE")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("ignoring settings file {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Save to the platform settings path.
    pub fn save(&self) -> Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut settings: Self = toml::from_str(content)?;
        settings.jpeg_quality = settings.jpeg_quality.clamp(1, 100);
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_export_contract() {
        let s = EngineSettings::default();
        assert_eq!((s.output_width, s.output_height), (1280, 720));
        assert_eq!(s.jpeg_quality, 90);
        assert_eq!(s.export_file_name, "thumbnail.jpg");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let s = EngineSettings::from_toml("jpeg_quality = 75\nfont_dir = \"/opt/fonts\"\n").unwrap();
        assert_eq!(s.jpeg_quality, 75);
        assert_eq!(s.font_dir, Some(PathBuf::from("/opt/fonts")));
        assert_eq!(s.output_width, 1280);
    }

    #[test]
    fn quality_is_clamped() {
        let s = EngineSettings::from_toml("jpeg_quality = 0").unwrap();
        assert_eq!(s.jpeg_quality, 1);
    }

    #[test]
    fn corrupt_file_is_config_error() {
        assert!(matches!(
            EngineSettings::from_toml("output_width = \"wide\""),
            Err(crate::error::ThumbError::Config(_))
        ));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let settings = EngineSettings {
            brush_size: 64.0,
            export_file_name: "cover.jpg".into(),
            ..EngineSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(EngineSettings::load_from(&path).unwrap(), settings);
    }
}
