//! The seam between the frame orchestrator and the GPU.
//!
//! [`FrameOrchestrator`](crate::orchestrator::FrameOrchestrator) only speaks
//! in frame slots and sync-object roles. A [`FrameBackend`] turns those into
//! API calls. [`FrameManager`](crate::frame_manager::FrameManager) is the
//! Vulkan implementation; tests drive the orchestrator with a recording
//! backend instead.
//!
//! Recoverable surface conditions never cross this seam as errors. They come
//! back as [`AcquireOutcome`], [`PresentOutcome`] and [`RecreateOutcome`].

use ash::vk;
use frameloop_rhi::RhiResult;

use crate::strategy::PipelineTarget;

/// The two CPU-waitable fences of a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceKind {
    /// Guards the slot's graphics command buffer.
    InFlight,
    /// Guards the slot's compute command buffer.
    ComputeInFlight,
}

/// The three binary semaphores of a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreKind {
    ImageAvailable,
    RenderFinished,
    ComputeFinished,
}

/// Queue a submission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Graphics,
    Compute,
}

/// One semaphore wait of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait {
    pub semaphore: SemaphoreKind,
    pub stage: vk::PipelineStageFlags,
}

/// A queue submission of one of the slot's command buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitDesc {
    pub queue: QueueKind,
    pub slot: usize,
    pub waits: Vec<SemaphoreWait>,
    pub signals: Vec<SemaphoreKind>,
    /// Fence signaled when the submission completes.
    pub fence: FenceKind,
}

impl SubmitDesc {
    /// Compute submission: no waits, signals `ComputeFinished` and
    /// `ComputeInFlight`.
    pub fn compute(slot: usize) -> Self {
        Self {
            queue: QueueKind::Compute,
            slot,
            waits: Vec::new(),
            signals: vec![SemaphoreKind::ComputeFinished],
            fence: FenceKind::ComputeInFlight,
        }
    }

    /// Graphics submission: waits on `ImageAvailable` at color output, plus
    /// `ComputeFinished` at `compute_stage` when the compute pass ran this
    /// tick. Signals `RenderFinished` and `InFlight`.
    pub fn graphics(slot: usize, compute_stage: Option<vk::PipelineStageFlags>) -> Self {
        let mut waits = vec![SemaphoreWait {
            semaphore: SemaphoreKind::ImageAvailable,
            stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        }];
        if let Some(stage) = compute_stage {
            waits.push(SemaphoreWait {
                semaphore: SemaphoreKind::ComputeFinished,
                stage,
            });
        }

        Self {
            queue: QueueKind::Graphics,
            slot,
            waits,
            signals: vec![SemaphoreKind::RenderFinished],
            fence: FenceKind::InFlight,
        }
    }

    pub fn waits_on(&self, semaphore: SemaphoreKind) -> bool {
        self.waits.iter().any(|wait| wait.semaphore == semaphore)
    }
}

/// Result of acquiring the next swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The image is usable. `suboptimal` asks for a recreation after present.
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface.
    OutOfDate,
}

/// Result of queueing a present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Result of a swapchain recreation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// A new swapchain and attachment set exist.
    Rebuilt {
        /// The surface format changed and the render pass was rebuilt.
        format_changed: bool,
    },
    /// The surface has a zero-sized extent. Nothing was created.
    Deferred,
}

/// GPU operations the orchestrator needs for one tick.
///
/// Every method that takes a `slot` addresses the per-slot objects created
/// for that frame index. Implementations must not reorder or batch calls.
pub trait FrameBackend {
    /// Command buffer handed to strategies for recording.
    type CommandBuffer;

    fn frames_in_flight(&self) -> usize;

    /// Render pass, formats and extent strategies build pipelines against.
    fn pipeline_target(&self) -> PipelineTarget;

    /// Blocks until the fence is signaled. The wait is unbounded.
    fn wait_for_fence(&mut self, slot: usize, fence: FenceKind) -> RhiResult<()>;

    fn reset_fence(&mut self, slot: usize, fence: FenceKind) -> RhiResult<()>;

    /// Acquires the next image, signaling the slot's `ImageAvailable`.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Resets and begins the slot's compute command buffer.
    fn begin_compute(&mut self, slot: usize) -> RhiResult<Self::CommandBuffer>;

    fn end_compute(&mut self, slot: usize) -> RhiResult<()>;

    /// Resets and begins the slot's graphics command buffer, then begins the
    /// render pass on the framebuffer of `image_index`.
    fn begin_graphics(&mut self, slot: usize, image_index: u32)
    -> RhiResult<Self::CommandBuffer>;

    /// Ends the render pass and the slot's graphics command buffer.
    fn end_graphics(&mut self, slot: usize) -> RhiResult<()>;

    fn submit(&mut self, submit: &SubmitDesc) -> RhiResult<()>;

    /// Presents `image_index`, waiting on the slot's `RenderFinished`.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Tears down and rebuilds the swapchain and its attachments for a
    /// framebuffer of size `framebuffer_extent`.
    fn recreate_swapchain(
        &mut self,
        framebuffer_extent: vk::Extent2D,
    ) -> RhiResult<RecreateOutcome>;

    fn wait_idle(&mut self) -> RhiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphics_submit_without_compute() {
        let submit = SubmitDesc::graphics(1, None);
        assert_eq!(submit.queue, QueueKind::Graphics);
        assert_eq!(submit.slot, 1);
        assert_eq!(submit.waits.len(), 1);
        assert!(submit.waits_on(SemaphoreKind::ImageAvailable));
        assert!(!submit.waits_on(SemaphoreKind::ComputeFinished));
        assert_eq!(submit.signals, vec![SemaphoreKind::RenderFinished]);
        assert_eq!(submit.fence, FenceKind::InFlight);
    }

    #[test]
    fn test_graphics_submit_with_compute() {
        let submit = SubmitDesc::graphics(0, Some(vk::PipelineStageFlags::VERTEX_INPUT));
        assert_eq!(
            submit.waits,
            vec![
                SemaphoreWait {
                    semaphore: SemaphoreKind::ImageAvailable,
                    stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                },
                SemaphoreWait {
                    semaphore: SemaphoreKind::ComputeFinished,
                    stage: vk::PipelineStageFlags::VERTEX_INPUT,
                },
            ]
        );
    }

    #[test]
    fn test_compute_submit_has_no_waits() {
        let submit = SubmitDesc::compute(0);
        assert!(submit.waits.is_empty());
        assert_eq!(submit.signals, vec![SemaphoreKind::ComputeFinished]);
        assert_eq!(submit.fence, FenceKind::ComputeInFlight);
    }

    #[test]
    fn test_present_outcome_needs_recreate() {
        assert!(!PresentOutcome::Presented.needs_recreate());
        assert!(PresentOutcome::Suboptimal.needs_recreate());
        assert!(PresentOutcome::OutOfDate.needs_recreate());
    }
}
