//! Render strategy interface.
//!
//! A strategy records the actual work of a frame: an optional compute pass
//! and the draw commands inside the render pass. The orchestrator calls it
//! at fixed points of every tick:
//!
//! 1. [`step_update`](RenderStrategy::step_update) after the image is acquired
//! 2. [`record_compute`](RenderStrategy::record_compute), only when
//!    [`needs_compute`](RenderStrategy::needs_compute) is true
//! 3. [`record_draw`](RenderStrategy::record_draw) inside the render pass
//!
//! Strategies are generic over the [`FrameBackend`] so the command buffer
//! type and the resources available at initialization come from it.

use ash::vk;
use frameloop_rhi::RhiResult;
use frameloop_rhi::descriptor::DescriptorPoolRequirement;

use crate::backend::FrameBackend;
use crate::frame::FrameInfo;

/// What graphics pipelines must be compatible with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTarget {
    pub render_pass: vk::RenderPass,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub extent: vk::Extent2D,
}

/// A pluggable recorder of per-frame GPU work.
pub trait RenderStrategy<B: FrameBackend> {
    /// Name used for selection from config and the command line.
    fn name(&self) -> &str;

    /// Whether the compute phase runs. Read at the start of every tick the
    /// strategy is active.
    fn needs_compute(&self) -> bool {
        false
    }

    /// Stage at which the graphics submission waits on the compute pass.
    fn compute_consuming_stage(&self) -> vk::PipelineStageFlags {
        vk::PipelineStageFlags::VERTEX_INPUT
    }

    /// Descriptors this strategy allocates from the shared pool. Queried
    /// once, before the pool is created.
    fn descriptor_pool_needs(&self) -> DescriptorPoolRequirement {
        DescriptorPoolRequirement::none()
    }

    /// Creates long-lived resources.
    fn initialize(&mut self, backend: &B) -> RhiResult<()>;

    /// Rebuilds pipelines after a render-pass-affecting format change.
    fn rebuild_pipeline(&mut self, target: &PipelineTarget) -> RhiResult<()>;

    /// Per-frame CPU update. `frame.delta_secs` holds the time since the
    /// previous tick.
    fn step_update(&mut self, frame: &FrameInfo) -> RhiResult<()>;

    /// Records the compute pass into a begun command buffer.
    fn record_compute(&mut self, _cmd: &B::CommandBuffer, _frame: &FrameInfo) -> RhiResult<()> {
        Ok(())
    }

    /// Records draw commands. The render pass is already active.
    fn record_draw(&mut self, cmd: &B::CommandBuffer, frame: &FrameInfo) -> RhiResult<()>;

    /// Releases resources. The device is idle when this is called.
    fn shutdown(&mut self, backend: &B);
}

/// Full-extent viewport for a dynamic-state draw.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-extent scissor rectangle.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_full_scissor() {
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, extent);
    }
}
