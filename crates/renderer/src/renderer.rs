//! Renderer façade.
//!
//! [`Renderer`] bootstraps the GPU context for a window (instance, surface,
//! physical and logical device), sizes the shared descriptor pool from the
//! registered strategies and hands everything to a [`FrameOrchestrator`].
//!
//! # Resource Destruction Order
//!
//! 1. Wait for all GPU work to complete, then shut the strategies down
//! 2. Frame sync objects and command pools
//! 3. Framebuffers, attachments, render pass and swapchain
//! 4. Descriptor pool
//! 5. Surface
//! 6. Device
//! 7. Instance
//!
//! `ManuallyDrop` is used to enforce that order.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info, warn};

use frameloop_core::{PresentModePreference, RenderConfig, SurfaceFormatPreference};
use frameloop_platform::{Surface, Window};
use frameloop_rhi::descriptor::{DescriptorPool, aggregate_pool_requirements};
use frameloop_rhi::device::Device;
use frameloop_rhi::instance::Instance;
use frameloop_rhi::physical_device::select_physical_device;
use frameloop_rhi::swapchain::SwapchainPreferences;
use frameloop_rhi::{RhiError, RhiResult};

use crate::frame_manager::FrameManager;
use crate::orchestrator::{FrameOrchestrator, FrameStatus};
use crate::strategies::builtin_strategies;
use crate::swapchain_manager::SwapchainManager;

/// Owns the GPU context and the frame orchestrator for one window.
pub struct Renderer {
    orchestrator: ManuallyDrop<FrameOrchestrator<FrameManager>>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,
}

impl Renderer {
    /// Creates the renderer for `window`.
    ///
    /// An unknown `config.strategy` name is logged and the first registered
    /// strategy is used instead.
    ///
    /// # Errors
    ///
    /// Any failure during bootstrap is fatal. Objects created before the
    /// failure are released.
    pub fn new(window: &Window, config: &RenderConfig) -> RhiResult<Self> {
        let extensions = window.required_extensions().map_err(platform_error)?;
        let instance = Instance::new(config.validation, &extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(platform_error)?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let framebuffer_extent = window.framebuffer_extent();
        let swapchain = SwapchainManager::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader(),
            swapchain_preferences(config),
            config.max_msaa_samples,
            framebuffer_extent,
        )?;

        let strategies = builtin_strategies(config.frames_in_flight);

        let requirements: Vec<_> = strategies
            .iter()
            .map(|strategy| strategy.descriptor_pool_needs())
            .collect();
        let pool_requirement = aggregate_pool_requirements(&requirements);
        let descriptor_pool = DescriptorPool::from_requirement(device.clone(), &pool_requirement)?;

        let frame_manager = FrameManager::new(
            device.clone(),
            swapchain,
            descriptor_pool,
            config.frames_in_flight,
        )?;

        let mut orchestrator = FrameOrchestrator::new(frame_manager, strategies, framebuffer_extent)?;
        if !orchestrator.select_strategy_by_name(&config.strategy) {
            warn!(
                "Falling back to render strategy '{}'",
                orchestrator.active_strategy_name()
            );
        }

        info!(
            "Renderer initialized on {} with strategy '{}'",
            physical_device.device_name(),
            orchestrator.active_strategy_name()
        );

        Ok(Self {
            orchestrator: ManuallyDrop::new(orchestrator),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Every error is fatal.
    pub fn render_frame(&mut self) -> RhiResult<FrameStatus> {
        self.orchestrator.tick()
    }

    /// Call from the window's resize event.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.orchestrator
            .notify_resized(vk::Extent2D { width, height });
    }

    pub fn select_strategy(&mut self, index: usize) -> bool {
        self.orchestrator.select_strategy(index)
    }

    pub fn select_strategy_by_name(&mut self, name: &str) -> bool {
        self.orchestrator.select_strategy_by_name(name)
    }

    pub fn cycle_strategy(&mut self) {
        self.orchestrator.cycle_strategy();
    }

    pub fn active_strategy_name(&self) -> &str {
        self.orchestrator.active_strategy_name()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.orchestrator.strategy_names()
    }

    pub fn tick_count(&self) -> u64 {
        self.orchestrator.tick_count()
    }

    pub fn has_validation(&self) -> bool {
        self.instance.has_validation()
    }

    /// Waits for the GPU and shuts the strategies down.
    ///
    /// Dropping the renderer does the same; calling this first lets the
    /// caller see the error.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        self.orchestrator.shutdown()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.orchestrator.shutdown() {
            error!("Renderer shutdown failed: {}", e);
        }

        // SAFETY: each field is dropped exactly once, in dependency order, and
        // never touched again.
        unsafe {
            ManuallyDrop::drop(&mut self.orchestrator);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

/// Maps the configured preferences onto Vulkan values.
pub fn swapchain_preferences(config: &RenderConfig) -> SwapchainPreferences {
    let surface_format = match config.surface_format {
        SurfaceFormatPreference::Srgb => SwapchainPreferences::SRGB_FORMAT,
        SurfaceFormatPreference::Unorm => SwapchainPreferences::UNORM_FORMAT,
    };
    let present_mode = match config.present_mode {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };

    SwapchainPreferences {
        surface_format,
        present_mode,
    }
}

fn platform_error(e: frameloop_core::Error) -> RhiError {
    RhiError::SurfaceError(e.to_string())
}
