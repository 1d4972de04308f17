//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over `ash`:
//! - Instance, physical device selection and logical device creation
//! - Swapchain creation and its format/present-mode/extent policy
//! - Semaphores, fences and the per-frame slot pool
//! - Command pools and buffers; storage, uniform and staging buffers
//! - Descriptor pools and set layouts
//! - WGSL shader modules, pipeline layouts, graphics and compute pipelines
//! - Attachment images, layout transitions, render passes and framebuffers

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
