//! Runtime configuration loaded from TOML.
//!
//! Every field has a default, so an absent file or a partial file is fine.
//! A file that exists but does not parse is an error.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "frameloop.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub log: LogConfig,
}

/// Initial window settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "frameloop".to_string(),
        }
    }
}

/// Presentation and frame-pacing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of frame slots cycled by the orchestrator.
    pub frames_in_flight: usize,
    pub present_mode: PresentModePreference,
    pub surface_format: SurfaceFormatPreference,
    /// Upper bound on the multisample count; the device may support less.
    pub max_msaa_samples: u32,
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
    /// Name of the strategy active on the first frame.
    pub strategy: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            present_mode: PresentModePreference::default(),
            surface_format: SurfaceFormatPreference::default(),
            max_msaa_samples: 8,
            validation: cfg!(debug_assertions),
            strategy: "gradient".to_string(),
        }
    }
}

/// Logging overrides. `RUST_LOG` still wins when set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: Option<String>,
}

/// Preferred presentation mode. FIFO is used when the preference is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Fifo,
    Immediate,
}

impl FromStr for PresentModePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mailbox" => Ok(Self::Mailbox),
            "fifo" => Ok(Self::Fifo),
            "immediate" => Ok(Self::Immediate),
            other => Err(Error::Config(format!("unknown present mode '{other}'"))),
        }
    }
}

impl fmt::Display for PresentModePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mailbox => "mailbox",
            Self::Fifo => "fifo",
            Self::Immediate => "immediate",
        };
        f.write_str(name)
    }
}

/// Preferred 8-bit BGRA surface encoding. The first supported format is used
/// when the preference is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceFormatPreference {
    #[default]
    Srgb,
    Unorm,
}

impl Config {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text)?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reject settings the renderer cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be nonzero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.render.frames_in_flight == 0 {
            return Err(Error::Config(
                "render.frames_in_flight must be at least 1".to_string(),
            ));
        }
        let samples = self.render.max_msaa_samples;
        if !samples.is_power_of_two() || samples > 64 {
            return Err(Error::Config(format!(
                "render.max_msaa_samples must be a power of two in 1..=64, got {samples}"
            )));
        }
        if self.render.strategy.is_empty() {
            return Err(Error::Config("render.strategy must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.render.frames_in_flight, 2);
        assert_eq!(config.render.present_mode, PresentModePreference::Mailbox);
        assert_eq!(config.render.surface_format, SurfaceFormatPreference::Srgb);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [render]
            present_mode = "fifo"
            frames_in_flight = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.render.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.render.frames_in_flight, 3);
        assert_eq!(config.render.max_msaa_samples, 8);
        assert_eq!(config.window.title, "frameloop");
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let err = Config::from_toml_str("[render]\nframes_in_flight = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_sample_cap_rejected() {
        assert!(Config::from_toml_str("[render]\nmax_msaa_samples = 6\n").is_err());
        assert!(Config::from_toml_str("[render]\nmax_msaa_samples = 128\n").is_err());
        assert!(Config::from_toml_str("[render]\nmax_msaa_samples = 1\n").is_ok());
    }

    #[test]
    fn test_unknown_enum_value_is_config_error() {
        let err = Config::from_toml_str("[render]\npresent_mode = \"vsync\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_present_mode_from_str() {
        assert_eq!(
            "Mailbox".parse::<PresentModePreference>().unwrap(),
            PresentModePreference::Mailbox
        );
        assert_eq!(
            "fifo".parse::<PresentModePreference>().unwrap(),
            PresentModePreference::Fifo
        );
        assert!("triple".parse::<PresentModePreference>().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load("definitely/not/here/frameloop.toml").unwrap();
        assert_eq!(config.render.strategy, "gradient");
    }
}
