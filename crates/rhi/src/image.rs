//! Attachment images, format probing and layout transitions.
//!
//! - [`AllocatedImage`] is a 2D image, its `gpu-allocator` memory and one view
//! - [`find_depth_format`] picks the first supported depth format in order of preference
//! - [`LayoutTransition`] is the table of supported layout transitions
//! - [`max_usable_sample_count`] picks the MSAA level

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info};

use crate::command::{CommandPool, submit_single_time};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Parameters of an [`AllocatedImage`].
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// A device-local 2D image with a single mip level and its view.
pub struct AllocatedImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl AllocatedImage {
    /// Creates the image, allocates and binds GPU-only memory, then creates
    /// the view.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero extent, or the first
    /// failing Vulkan or allocator call. Partially created objects are
    /// released.
    pub fn new(device: Arc<Device>, desc: ImageDesc, name: &str) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image '{}' dimensions must be greater than 0",
                name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = match device.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .and_then(|()| {
                    let view_info = vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(desc.format)
                        .subresource_range(subresource_range(desc.aspect));
                    device.handle().create_image_view(&view_info, None)
                })
        };

        let view = match view {
            Ok(view) => view,
            Err(e) => {
                device.free_allocation(allocation);
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        debug!(
            "Created image '{}': {}x{} {:?} {:?}",
            name, desc.extent.width, desc.extent.height, desc.format, desc.samples
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            desc,
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free_allocation(allocation);
        }
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Returns the first candidate whose features for `tiling` include all of
/// `features`. `properties_of` supplies the format properties.
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties_of: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> RhiResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let properties = properties_of(format);
            let supported = match tiling {
                vk::ImageTiling::LINEAR => properties.linear_tiling_features,
                _ => properties.optimal_tiling_features,
            };
            supported.contains(features)
        })
        .ok_or_else(|| {
            RhiError::UnsupportedFormat(format!(
                "none of {:?} support {:?} with {:?} tiling",
                candidates, features, tiling
            ))
        })
}

/// Picks the depth attachment format for a physical device.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if no candidate supports
/// optimal-tiling depth/stencil attachments.
pub fn find_depth_format(instance: &Instance, device: &Device) -> RhiResult<vk::Format> {
    let format = find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        |format| unsafe {
            instance
                .handle()
                .get_physical_device_format_properties(device.physical_device(), format)
        },
    )?;

    info!("Depth format: {:?}", format);
    Ok(format)
}

#[inline]
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Highest sample count in `supported` that does not exceed `cap`.
///
/// `cap` is a plain count (1, 2, 4, ..., 64); anything not in `supported`
/// is skipped and the result falls back to a single sample.
pub fn max_usable_sample_count(supported: vk::SampleCountFlags, cap: u32) -> vk::SampleCountFlags {
    const ORDER: [(vk::SampleCountFlags, u32); 6] = [
        (vk::SampleCountFlags::TYPE_64, 64),
        (vk::SampleCountFlags::TYPE_32, 32),
        (vk::SampleCountFlags::TYPE_16, 16),
        (vk::SampleCountFlags::TYPE_8, 8),
        (vk::SampleCountFlags::TYPE_4, 4),
        (vk::SampleCountFlags::TYPE_2, 2),
    ];

    ORDER
        .iter()
        .find(|(flag, count)| *count <= cap && supported.contains(*flag))
        .map(|(flag, _)| *flag)
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Access masks and stages for one supported layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Looks up the barrier parameters for `old -> new`.
    ///
    /// # Errors
    ///
    /// Any pair outside the table is [`RhiError::UnsupportedLayoutTransition`].
    pub fn for_layouts(old: vk::ImageLayout, new: vk::ImageLayout) -> RhiResult<Self> {
        use vk::ImageLayout as L;

        match (old, new) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(Self {
                src_access: vk::AccessFlags::NONE,
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            }),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(Self {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            }),
            (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok(Self {
                src_access: vk::AccessFlags::NONE,
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            }),
            _ => Err(RhiError::UnsupportedLayoutTransition { old, new }),
        }
    }
}

/// Aspect mask a barrier into `new` must cover for an image of `format`.
pub fn transition_aspect(format: vk::Format, new: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Transitions `image` with a one-shot command buffer and waits for it.
///
/// # Errors
///
/// Fails before recording anything if the transition is unsupported.
pub fn transition_image_layout(
    device: &Arc<Device>,
    pool: &CommandPool,
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<()> {
    let transition = LayoutTransition::for_layouts(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .image(image)
        .old_layout(old)
        .new_layout(new)
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(subresource_range(transition_aspect(format, new)));

    submit_single_time(device, pool, |cmd| {
        cmd.pipeline_barrier(
            transition.src_stage,
            transition.dst_stage,
            std::slice::from_ref(&barrier),
        );
        Ok(())
    })?;

    debug!("Transitioned image {:?}: {:?} -> {:?}", image, old, new);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(optimal: vk::FormatFeatureFlags) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: optimal,
            ..Default::default()
        }
    }

    #[test]
    fn test_depth_format_takes_first_supported() {
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| match format {
                vk::Format::D32_SFLOAT => props(vk::FormatFeatureFlags::empty()),
                _ => props(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
            },
        );
        assert_eq!(format.ok(), Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn test_depth_format_falls_back_to_d24() {
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| match format {
                vk::Format::D24_UNORM_S8_UINT => {
                    props(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
                }
                _ => props(vk::FormatFeatureFlags::empty()),
            },
        );
        assert_eq!(format.ok(), Some(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_depth_format_checks_requested_tiling() {
        // Linear support alone does not satisfy an optimal-tiling request
        let result = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(RhiError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_has_stencil_component() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_max_usable_sample_count() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;

        assert_eq!(
            max_usable_sample_count(supported, 64),
            vk::SampleCountFlags::TYPE_8
        );
        assert_eq!(
            max_usable_sample_count(supported, 4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            max_usable_sample_count(supported, 1),
            vk::SampleCountFlags::TYPE_1
        );
        assert_eq!(
            max_usable_sample_count(vk::SampleCountFlags::TYPE_1, 8),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_layout_transition_table() {
        let depth = LayoutTransition::for_layouts(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        );
        assert!(matches!(
            depth,
            Ok(t) if t.dst_stage == vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        ));

        let upload = LayoutTransition::for_layouts(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(matches!(
            upload,
            Ok(t) if t.dst_access == vk::AccessFlags::TRANSFER_WRITE
        ));

        let sample = LayoutTransition::for_layouts(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(matches!(
            sample,
            Ok(t) if t.src_stage == vk::PipelineStageFlags::TRANSFER
        ));
    }

    #[test]
    fn test_unsupported_layout_transition() {
        let result = LayoutTransition::for_layouts(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(matches!(
            result,
            Err(RhiError::UnsupportedLayoutTransition {
                old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            })
        ));
    }

    #[test]
    fn test_transition_aspect() {
        assert_eq!(
            transition_aspect(
                vk::Format::D24_UNORM_S8_UINT,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            ),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            transition_aspect(
                vk::Format::D32_SFLOAT,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            ),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            transition_aspect(
                vk::Format::R8G8B8A8_SRGB,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL
            ),
            vk::ImageAspectFlags::COLOR
        );
    }
}
