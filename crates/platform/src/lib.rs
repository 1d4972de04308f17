//! Platform layer for the frame loop.
//!
//! This crate provides:
//! - Window management via winit
//! - Vulkan surface creation (the presentation surface binding)
//! - Key bindings for strategy selection

mod input;
mod window;

pub use input::{InputAction, KeyCode, action_for_key};
pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::event::{Event, WindowEvent};
pub use winit::event_loop::EventLoop;
