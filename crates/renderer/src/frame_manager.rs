//! Vulkan implementation of [`FrameBackend`].
//!
//! [`FrameManager`] owns the per-frame resources the orchestrator addresses
//! by slot index:
//!
//! - one [`FrameSlot`] of sync objects per frame in flight
//! - one graphics and one compute command buffer per frame in flight
//! - the [`SwapchainManager`] and the shared descriptor pool
//!
//! # Synchronization Flow
//!
//! ```text
//! compute:  wait/reset compute_in_flight -> record -> submit
//!           (no waits, signals compute_finished + compute_in_flight)
//! graphics: reset in_flight -> record render pass -> submit
//!           (waits image_available [+ compute_finished],
//!            signals render_finished + in_flight)
//! present:  waits render_finished
//! ```
//!
//! Both queue kinds go to the device's combined graphics+compute queue;
//! ordering between them still comes only from the semaphores.

use std::sync::Arc;

use ash::vk;
use frameloop_rhi::command::{CommandBuffer, CommandPool, submit_single_time};
use frameloop_rhi::descriptor::DescriptorPool;
use frameloop_rhi::device::Device;
use frameloop_rhi::render_pass::clear_values;
use frameloop_rhi::sync::{Fence, FrameSlot, FrameSyncPool, Semaphore};
use frameloop_rhi::{RhiError, RhiResult};
use tracing::{debug, info, trace};

use crate::backend::{
    AcquireOutcome, FenceKind, FrameBackend, PresentOutcome, QueueKind, RecreateOutcome,
    SemaphoreKind, SubmitDesc,
};
use crate::strategy::{PipelineTarget, full_scissor};
use crate::swapchain_manager::SwapchainManager;

/// Per-frame resources and the swapchain, driven by the orchestrator.
///
/// # Thread Safety
///
/// The frame manager is not thread-safe. It should only be accessed from
/// the thread that runs the frame loop.
pub struct FrameManager {
    // Field order is drop order.
    graphics_commands: Vec<CommandBuffer>,
    compute_commands: Vec<CommandBuffer>,
    command_pool: CommandPool,
    sync: FrameSyncPool,
    swapchain: SwapchainManager,
    descriptor_pool: DescriptorPool,
    device: Arc<Device>,
}

impl FrameManager {
    /// Allocates sync objects and command buffers for `frames_in_flight`
    /// slots.
    ///
    /// # Errors
    ///
    /// Returns an error if `frames_in_flight` is zero or any object cannot
    /// be created.
    pub fn new(
        device: Arc<Device>,
        swapchain: SwapchainManager,
        descriptor_pool: DescriptorPool,
        frames_in_flight: usize,
    ) -> RhiResult<Self> {
        let sync = FrameSyncPool::allocate(device.clone(), frames_in_flight)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_compute_family())?;
        let graphics_commands = command_pool.allocate_per_frame(frames_in_flight)?;
        let compute_commands = command_pool.allocate_per_frame(frames_in_flight)?;

        info!(
            "Frame manager created with {} frame(s) in flight",
            frames_in_flight
        );

        Ok(Self {
            graphics_commands,
            compute_commands,
            command_pool,
            sync,
            swapchain,
            descriptor_pool,
            device,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Shared descriptor pool sized for every registered strategy.
    #[inline]
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    /// Records and runs a one-shot command buffer, blocking until the GPU
    /// has executed it. Meant for uploads during strategy initialization.
    ///
    /// # Errors
    ///
    /// Returns the first error from recording, submission or the wait.
    pub fn submit_single_time<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        submit_single_time(&self.device, &self.command_pool, record)
    }

    fn slot(&self, slot: usize) -> &FrameSlot {
        self.sync.slot(slot)
    }

    fn fence(&self, slot: usize, kind: FenceKind) -> &Fence {
        let frame = self.slot(slot);
        match kind {
            FenceKind::InFlight => frame.in_flight(),
            FenceKind::ComputeInFlight => frame.compute_in_flight(),
        }
    }

    fn semaphore(&self, slot: usize, kind: SemaphoreKind) -> &Semaphore {
        let frame = self.slot(slot);
        match kind {
            SemaphoreKind::ImageAvailable => frame.image_available(),
            SemaphoreKind::RenderFinished => frame.render_finished(),
            SemaphoreKind::ComputeFinished => frame.compute_finished(),
        }
    }

    fn command_buffer(&self, queue: QueueKind, slot: usize) -> &CommandBuffer {
        match queue {
            QueueKind::Graphics => &self.graphics_commands[slot],
            QueueKind::Compute => &self.compute_commands[slot],
        }
    }

    fn begin_commands(&self, queue: QueueKind, slot: usize) -> RhiResult<CommandBuffer> {
        let cmd = self.command_buffer(queue, slot);
        cmd.reset()?;
        cmd.begin()?;
        Ok(cmd.clone())
    }
}

impl FrameBackend for FrameManager {
    type CommandBuffer = CommandBuffer;

    fn frames_in_flight(&self) -> usize {
        self.sync.len()
    }

    fn pipeline_target(&self) -> PipelineTarget {
        self.swapchain.pipeline_target()
    }

    fn wait_for_fence(&mut self, slot: usize, fence: FenceKind) -> RhiResult<()> {
        self.fence(slot, fence).wait(u64::MAX)
    }

    fn reset_fence(&mut self, slot: usize, fence: FenceKind) -> RhiResult<()> {
        self.fence(slot, fence).reset()
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.semaphore(slot, SemaphoreKind::ImageAvailable).handle();

        match self.swapchain.swapchain()?.acquire_next_image(semaphore) {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    debug!("Swapchain suboptimal at acquire");
                }
                Ok(AcquireOutcome::Ready {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn begin_compute(&mut self, slot: usize) -> RhiResult<CommandBuffer> {
        self.begin_commands(QueueKind::Compute, slot)
    }

    fn end_compute(&mut self, slot: usize) -> RhiResult<()> {
        self.command_buffer(QueueKind::Compute, slot).end()
    }

    fn begin_graphics(&mut self, slot: usize, image_index: u32) -> RhiResult<CommandBuffer> {
        let attachments = self.swapchain.attachments()?;
        let framebuffer = attachments.framebuffer(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No framebuffer for image {}", image_index))
        })?;
        let render_area = full_scissor(attachments.extent());
        let render_pass = self.swapchain.render_pass().handle();

        let cmd = self.begin_commands(QueueKind::Graphics, slot)?;
        cmd.begin_render_pass(render_pass, framebuffer, render_area, &clear_values());
        Ok(cmd)
    }

    fn end_graphics(&mut self, slot: usize) -> RhiResult<()> {
        let cmd = self.command_buffer(QueueKind::Graphics, slot);
        cmd.end_render_pass();
        cmd.end()
    }

    fn submit(&mut self, submit: &SubmitDesc) -> RhiResult<()> {
        let wait_semaphores: Vec<vk::Semaphore> = submit
            .waits
            .iter()
            .map(|wait| self.semaphore(submit.slot, wait.semaphore).handle())
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            submit.waits.iter().map(|wait| wait.stage).collect();
        let signal_semaphores: Vec<vk::Semaphore> = submit
            .signals
            .iter()
            .map(|&kind| self.semaphore(submit.slot, kind).handle())
            .collect();
        let command_buffers = [self.command_buffer(submit.queue, submit.slot).handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let fence = self.fence(submit.slot, submit.fence).handle();

        // SAFETY: the command buffer was recorded by this tick and the fence
        // was reset right before recording.
        unsafe {
            self.device
                .submit(std::slice::from_ref(&submit_info), fence)?;
        }

        trace!(
            "Submitted {:?} work for slot {} ({} wait(s))",
            submit.queue,
            submit.slot,
            submit.waits.len()
        );
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let wait = self.semaphore(slot, SemaphoreKind::RenderFinished).handle();

        match self
            .swapchain
            .swapchain()?
            .present(self.device.present_queue(), image_index, wait)
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn recreate_swapchain(
        &mut self,
        framebuffer_extent: vk::Extent2D,
    ) -> RhiResult<RecreateOutcome> {
        self.swapchain.recreate(framebuffer_extent)
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for FrameManager {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle: {}", e);
        }
        debug!("Frame manager destroyed");
    }
}
