//! Core utilities shared by every frameloop crate.
//!
//! This crate provides:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    Config, LogConfig, PresentModePreference, RenderConfig, SurfaceFormatPreference,
    WindowConfig, DEFAULT_CONFIG_PATH,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
