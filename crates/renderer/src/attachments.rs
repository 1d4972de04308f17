//! Per-swapchain attachment resources.
//!
//! An [`AttachmentSet`] is built for exactly one swapchain: a multisampled
//! color target, a multisampled depth target and one framebuffer per
//! swapchain image that resolves into that image. It is dropped and rebuilt
//! together with the swapchain, so its extent always matches.

use std::sync::Arc;

use ash::vk;
use frameloop_rhi::RhiResult;
use frameloop_rhi::command::CommandPool;
use frameloop_rhi::device::Device;
use frameloop_rhi::image::{AllocatedImage, ImageDesc, transition_image_layout};
use frameloop_rhi::render_pass::{Framebuffer, RenderPass};
use frameloop_rhi::swapchain::Swapchain;
use tracing::debug;

/// Multisampled color and depth targets plus framebuffers for one swapchain.
pub struct AttachmentSet {
    // Framebuffers reference the views below and go first.
    framebuffers: Vec<Framebuffer>,
    _color: AllocatedImage,
    _depth: AllocatedImage,
    extent: vk::Extent2D,
}

impl AttachmentSet {
    /// Creates the attachments for `swapchain`.
    ///
    /// The depth image is moved to `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` once
    /// with a one-shot command buffer from `transfer_pool`.
    ///
    /// # Errors
    ///
    /// Returns the first failing allocation, creation or transition error.
    pub fn new(
        device: &Arc<Device>,
        transfer_pool: &CommandPool,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
    ) -> RhiResult<Self> {
        let desc = *render_pass.desc();
        let extent = swapchain.extent();

        let color = AllocatedImage::new(
            device.clone(),
            color_image_desc(extent, desc.color_format, desc.samples),
            "msaa color",
        )?;

        let depth = AllocatedImage::new(
            device.clone(),
            depth_image_desc(extent, desc.depth_format, desc.samples),
            "msaa depth",
        )?;

        transition_image_layout(
            device,
            transfer_pool,
            depth.image(),
            desc.depth_format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&resolve_view| {
                Framebuffer::new(
                    device.clone(),
                    render_pass.handle(),
                    &framebuffer_views(color.view(), depth.view(), resolve_view),
                    extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        debug!(
            "Attachment set created: {}x{}, {:?}, {} framebuffers",
            extent.width,
            extent.height,
            desc.samples,
            framebuffers.len()
        );

        Ok(Self {
            framebuffers,
            _color: color,
            _depth: depth,
            extent,
        })
    }

    /// Framebuffer whose resolve target is swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Transient multisampled color target, resolved at the end of the subpass.
fn color_image_desc(
    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> ImageDesc {
    ImageDesc {
        extent,
        format,
        samples,
        usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
            | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        aspect: vk::ImageAspectFlags::COLOR,
    }
}

/// The view aspect is depth only; stencil is never sampled.
fn depth_image_desc(
    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> ImageDesc {
    ImageDesc {
        extent,
        format,
        samples,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        aspect: vk::ImageAspectFlags::DEPTH,
    }
}

/// Views in render pass attachment order: color, depth, resolve.
fn framebuffer_views(
    color: vk::ImageView,
    depth: vk::ImageView,
    resolve: vk::ImageView,
) -> [vk::ImageView; 3] {
    [color, depth, resolve]
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use frameloop_rhi::render_pass::{COLOR_ATTACHMENT, DEPTH_ATTACHMENT, RESOLVE_ATTACHMENT};

    use super::*;

    #[test]
    fn test_framebuffer_views_follow_attachment_indices() {
        let color = vk::ImageView::from_raw(1);
        let depth = vk::ImageView::from_raw(2);
        let resolve = vk::ImageView::from_raw(3);

        let views = framebuffer_views(color, depth, resolve);

        assert_eq!(views[COLOR_ATTACHMENT as usize], color);
        assert_eq!(views[DEPTH_ATTACHMENT as usize], depth);
        assert_eq!(views[RESOLVE_ATTACHMENT as usize], resolve);
    }

    #[test]
    fn test_color_target_is_transient_multisampled() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let desc = color_image_desc(
            extent,
            vk::Format::B8G8R8A8_SRGB,
            vk::SampleCountFlags::TYPE_4,
        );

        assert_eq!(desc.extent, extent);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_4);
        assert!(
            desc.usage
                .contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT)
        );
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert_eq!(desc.aspect, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_depth_target_matches_color_samples() {
        let desc = depth_image_desc(
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            vk::Format::D24_UNORM_S8_UINT,
            vk::SampleCountFlags::TYPE_4,
        );

        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(desc.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
    }
}
