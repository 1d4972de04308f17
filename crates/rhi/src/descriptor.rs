//! Descriptor pool sizing and descriptor set management.
//!
//! The renderer uses one shared descriptor pool. Its size is not known up
//! front: every registered render strategy declares a
//! [`DescriptorPoolRequirement`], and [`aggregate_pool_requirements`] folds
//! them together with a fixed reservation for the UI overlay.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use frameloop_rhi::device::Device;
//! use frameloop_rhi::descriptor::{
//!     aggregate_pool_requirements, DescriptorPool, DescriptorPoolRequirement,
//! };
//!
//! # fn example(device: Arc<Device>) -> Result<(), frameloop_rhi::RhiError> {
//! let particles = DescriptorPoolRequirement::new(
//!     vec![vk::DescriptorPoolSize {
//!         ty: vk::DescriptorType::STORAGE_BUFFER,
//!         descriptor_count: 2,
//!     }],
//!     2,
//! );
//!
//! let total = aggregate_pool_requirements(&[particles]);
//! let pool = DescriptorPool::from_requirement(device, &total)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Pool sizes and set count one consumer needs from the shared pool.
#[derive(Debug, Clone, Default)]
pub struct DescriptorPoolRequirement {
    pub pool_sizes: Vec<vk::DescriptorPoolSize>,
    pub max_sets: u32,
}

// `vk::DescriptorPoolSize` does not implement `PartialEq`, so compare field-wise.
impl PartialEq for DescriptorPoolRequirement {
    fn eq(&self, other: &Self) -> bool {
        self.max_sets == other.max_sets
            && self.pool_sizes.len() == other.pool_sizes.len()
            && self
                .pool_sizes
                .iter()
                .zip(&other.pool_sizes)
                .all(|(a, b)| a.ty == b.ty && a.descriptor_count == b.descriptor_count)
    }
}

impl Eq for DescriptorPoolRequirement {}

impl DescriptorPoolRequirement {
    pub fn new(pool_sizes: Vec<vk::DescriptorPoolSize>, max_sets: u32) -> Self {
        Self {
            pool_sizes,
            max_sets,
        }
    }

    /// No descriptors at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// The UI overlay's font atlas: one combined image sampler in one set.
    pub fn ui_overlay() -> Self {
        Self::new(
            vec![vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
            }],
            1,
        )
    }

    /// Total descriptors requested for `ty` across all entries.
    pub fn descriptor_count(&self, ty: vk::DescriptorType) -> u32 {
        self.pool_sizes
            .iter()
            .filter(|size| size.ty == ty)
            .map(|size| size.descriptor_count)
            .sum()
    }
}

/// Builds the shared pool requirement.
///
/// The UI reservation comes first, then each requirement's pool sizes in
/// the order given. Entries are appended, not merged by type, and `max_sets`
/// is the sum over everything.
pub fn aggregate_pool_requirements(
    requirements: &[DescriptorPoolRequirement],
) -> DescriptorPoolRequirement {
    let mut total = DescriptorPoolRequirement::ui_overlay();

    for requirement in requirements {
        total
            .pool_sizes
            .extend(requirement.pool_sizes.iter().copied());
        total.max_sets += requirement.max_sets;
    }

    total
}

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a descriptor set layout from its bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool wrapper.
///
/// Created with `FREE_DESCRIPTOR_SET` so consumers can hand their sets back
/// individually on shutdown.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a descriptor pool.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Creates a pool sized by an aggregated requirement.
    pub fn from_requirement(
        device: Arc<Device>,
        requirement: &DescriptorPoolRequirement,
    ) -> RhiResult<Self> {
        Self::new(device, requirement.max_sets, &requirement.pool_sizes)
    }

    /// Allocates one set per layout.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails (e.g. pool exhausted).
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Returns sets to the pool. They must not be in use by the GPU.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if sets.is_empty() {
            return Ok(());
        }

        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Writes descriptor updates. A no-op for an empty slice.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }

    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Single storage buffer binding.
#[inline]
pub fn storage_buffer_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

/// Single uniform buffer binding.
#[inline]
pub fn uniform_buffer_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(ty: vk::DescriptorType, descriptor_count: u32) -> vk::DescriptorPoolSize {
        vk::DescriptorPoolSize {
            ty,
            descriptor_count,
        }
    }

    #[test]
    fn test_aggregate_with_no_strategies_is_ui_only() {
        let total = aggregate_pool_requirements(&[]);
        assert_eq!(total, DescriptorPoolRequirement::ui_overlay());
        assert_eq!(total.max_sets, 1);
    }

    #[test]
    fn test_aggregate_appends_in_order_and_sums_sets() {
        let mesh = DescriptorPoolRequirement::new(
            vec![
                size(vk::DescriptorType::UNIFORM_BUFFER, 2),
                size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
            ],
            2,
        );
        let particles =
            DescriptorPoolRequirement::new(vec![size(vk::DescriptorType::STORAGE_BUFFER, 4)], 2);

        let total = aggregate_pool_requirements(&[mesh, DescriptorPoolRequirement::none(), particles]);

        let types: Vec<_> = total.pool_sizes.iter().map(|s| s.ty).collect();
        assert_eq!(
            types,
            vec![
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::DescriptorType::STORAGE_BUFFER,
            ]
        );
        assert_eq!(total.max_sets, 5);
        assert_eq!(
            total.descriptor_count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            3
        );
        assert_eq!(total.descriptor_count(vk::DescriptorType::STORAGE_BUFFER), 4);
    }

    #[test]
    fn test_storage_buffer_binding() {
        let binding = storage_buffer_binding(1, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = uniform_buffer_binding(0, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
    }

    #[test]
    fn test_buffer_info_helper() {
        let info = buffer_info(vk::Buffer::null(), 64, 128);
        assert_eq!(info.offset, 64);
        assert_eq!(info.range, 128);
    }
}
