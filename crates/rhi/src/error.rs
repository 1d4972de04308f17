//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Recoverable presentation results (`ERROR_OUT_OF_DATE_KHR`,
/// `SUBOPTIMAL_KHR`) are not represented here; callers turn those into
/// outcome values before anything is propagated.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// The device rejected swapchain creation
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(vk::Result),

    /// None of the candidate formats support the required features
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A layout transition outside the supported table was requested
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// WGSL translation or shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Pipeline configuration or creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
