//! Swapchain lifetime management.
//!
//! [`SwapchainManager`] owns everything whose lifetime is tied to the
//! presentation surface: the swapchain, the [`AttachmentSet`] built for it
//! and the render pass those attachments are compatible with.
//!
//! Recreation always tears the old swapchain down completely before the new
//! one is created. The render pass survives recreation unless the surface
//! format changes; extent-only changes are absorbed by dynamic viewport and
//! scissor state.

use std::sync::Arc;

use ash::vk;
use frameloop_rhi::command::CommandPool;
use frameloop_rhi::device::Device;
use frameloop_rhi::image::{find_depth_format, max_usable_sample_count};
use frameloop_rhi::instance::Instance;
use frameloop_rhi::render_pass::{RenderPass, RenderPassDesc};
use frameloop_rhi::swapchain::{
    Swapchain, SwapchainPlan, SwapchainPreferences, SwapchainSupportDetails,
};
use frameloop_rhi::{RhiError, RhiResult};
use tracing::{debug, info};

use crate::attachments::AttachmentSet;
use crate::backend::RecreateOutcome;
use crate::strategy::PipelineTarget;

/// Owns the swapchain, its attachments and the render pass.
pub struct SwapchainManager {
    // Field order is drop order: framebuffers and attachment images, then
    // the swapchain views they resolve into, then the render pass.
    attachments: Option<AttachmentSet>,
    swapchain: Option<Swapchain>,
    render_pass: RenderPass,
    transfer_pool: CommandPool,
    device: Arc<Device>,
    instance: ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    preferences: SwapchainPreferences,
}

impl SwapchainManager {
    /// Builds the render pass and, unless the surface is currently
    /// zero-sized, the first swapchain and attachment set.
    ///
    /// `max_samples` caps the multisample level (1, 2, 4, ... 64).
    ///
    /// # Errors
    ///
    /// Fails if the surface offers no formats or present modes, no depth
    /// format is usable, or any object cannot be created.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        preferences: SwapchainPreferences,
        max_samples: u32,
        framebuffer_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let transfer_pool = CommandPool::new_transient(device.clone(), device.graphics_compute_family())?;

        let depth_format = find_depth_format(instance, &device)?;
        let samples = max_usable_sample_count(device.msaa_sample_counts(), max_samples);
        info!("MSAA samples: {:?}", samples);

        let plan = Self::plan_for(&device, surface, surface_loader, &preferences, framebuffer_extent)?;

        let render_pass = RenderPass::new(
            device.clone(),
            RenderPassDesc {
                color_format: plan.surface_format.format,
                depth_format,
                samples,
            },
        )?;

        let mut manager = Self {
            attachments: None,
            swapchain: None,
            render_pass,
            transfer_pool,
            device,
            instance: instance.handle().clone(),
            surface,
            surface_loader: surface_loader.clone(),
            preferences,
        };

        if is_zero(plan.extent) {
            info!("Surface is zero-sized at startup, swapchain creation deferred");
        } else {
            manager.build(&plan)?;
        }

        Ok(manager)
    }

    /// Tears down and rebuilds the swapchain and attachment set.
    ///
    /// Nothing is destroyed when the surface currently reports a zero-sized
    /// extent; the caller gets [`RecreateOutcome::Deferred`] and should retry
    /// once the window has a nonzero size again.
    ///
    /// # Errors
    ///
    /// Any failure is fatal and leaves the manager without a swapchain.
    pub fn recreate(&mut self, framebuffer_extent: vk::Extent2D) -> RhiResult<RecreateOutcome> {
        let plan = Self::plan_for(
            &self.device,
            self.surface,
            &self.surface_loader,
            &self.preferences,
            framebuffer_extent,
        )?;

        if is_zero(plan.extent) {
            debug!("Surface extent is zero, not recreating swapchain");
            return Ok(RecreateOutcome::Deferred);
        }

        // In-flight command buffers may still reference the attachments.
        self.device.wait_idle()?;

        self.attachments = None;
        self.swapchain = None;

        let format_changed = plan.surface_format.format != self.render_pass.desc().color_format;
        if format_changed {
            let desc = RenderPassDesc {
                color_format: plan.surface_format.format,
                ..*self.render_pass.desc()
            };
            self.render_pass = RenderPass::new(self.device.clone(), desc)?;
            info!("Render pass rebuilt for {:?}", desc.color_format);
        }

        self.build(&plan)?;

        Ok(RecreateOutcome::Rebuilt { format_changed })
    }

    fn build(&mut self, plan: &SwapchainPlan) -> RhiResult<()> {
        let swapchain = Swapchain::new(&self.instance, self.device.clone(), self.surface, plan)?;
        let attachments =
            AttachmentSet::new(&self.device, &self.transfer_pool, &swapchain, &self.render_pass)?;

        self.swapchain = Some(swapchain);
        self.attachments = Some(attachments);
        Ok(())
    }

    fn plan_for(
        device: &Device,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        preferences: &SwapchainPreferences,
        framebuffer_extent: vk::Extent2D,
    ) -> RhiResult<SwapchainPlan> {
        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;

        if !support.is_adequate() {
            return Err(RhiError::SurfaceError(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        Ok(SwapchainPlan::select(&support, preferences, framebuffer_extent))
    }

    /// The current swapchain.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] while creation is deferred.
    pub fn swapchain(&self) -> RhiResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("No swapchain".to_string()))
    }

    /// The attachment set of the current swapchain.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] while creation is deferred.
    pub fn attachments(&self) -> RhiResult<&AttachmentSet> {
        self.attachments
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("No attachment set".to_string()))
    }

    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Current swapchain extent, zero while creation is deferred.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map(Swapchain::extent)
            .unwrap_or_default()
    }

    pub fn pipeline_target(&self) -> PipelineTarget {
        let desc = self.render_pass.desc();
        PipelineTarget {
            render_pass: self.render_pass.handle(),
            color_format: desc.color_format,
            depth_format: desc.depth_format,
            samples: desc.samples,
            extent: self.extent(),
        }
    }
}

fn is_zero(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
