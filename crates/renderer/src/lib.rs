//! Frame orchestration for the presentation loop.
//!
//! This crate drives frames from acquire to present:
//! - [`FrameOrchestrator`]: the per-tick state machine
//! - [`FrameBackend`]: the GPU seam it runs against, implemented for Vulkan
//!   by [`FrameManager`]
//! - [`SwapchainManager`] and [`AttachmentSet`]: swapchain-bound resources
//! - [`RenderStrategy`]: pluggable recorders of compute and draw work
//! - [`Renderer`]: bootstraps the GPU context for a window

pub mod attachments;
pub mod backend;
pub mod frame;
pub mod frame_manager;
pub mod orchestrator;
pub mod renderer;
pub mod strategies;
pub mod strategy;
pub mod swapchain_manager;

pub use attachments::AttachmentSet;
pub use backend::{
    AcquireOutcome, FenceKind, FrameBackend, PresentOutcome, QueueKind, RecreateOutcome,
    SemaphoreKind, SemaphoreWait, SubmitDesc,
};
pub use frame::{DEFAULT_FRAMES_IN_FLIGHT, FrameCounter, FrameInfo};
pub use frame_manager::FrameManager;
pub use orchestrator::{FrameOrchestrator, FrameStatus};
pub use renderer::Renderer;
pub use strategy::{PipelineTarget, RenderStrategy};
pub use swapchain_manager::SwapchainManager;
