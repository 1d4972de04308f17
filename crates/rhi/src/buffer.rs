//! GPU buffers backed by `gpu-allocator` memory.
//!
//! A [`Buffer`] is created from a [`BufferKind`] describing usage flags and
//! memory location together:
//!
//! - device-local storage buffers, written by a compute pass and read as
//!   storage or vertex input by later passes
//! - host-visible uniform buffers, rewritten by the CPU once per frame slot
//! - host-visible staging buffers, the source of one-shot uploads

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// How a buffer is going to be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// Written on the GPU by compute or transfer, read as storage or vertex
    /// input by later passes.
    Storage,
    /// Host-visible, written with [`Buffer::write`].
    Uniform,
    /// Host-visible copy source.
    Staging,
}

impl BufferKind {
    pub fn usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferKind::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferKind::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferKind::Storage => MemoryLocation::GpuOnly,
            BufferKind::Uniform | BufferKind::Staging => MemoryLocation::CpuToGpu,
        }
    }
}

/// Vulkan buffer with its allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero size, or the error from
    /// buffer creation, allocation or binding.
    pub fn new(
        device: Arc<Device>,
        kind: BufferKind,
        size: vk::DeviceSize,
        name: &str,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(kind.usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = match device.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: kind.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            device.free_allocation(allocation);
            unsafe { device.handle().destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        debug!("Created {:?} buffer '{}': {} bytes", kind, name, size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Copies `data` into a host-visible buffer at `offset`.
    ///
    /// The range must not be in use by a pending GPU command.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the write runs past the end of
    /// the buffer or the memory is not host-mapped.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free_allocation(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_is_device_local_copy_target() {
        let usage = BufferKind::Storage.usage();
        assert!(usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert_eq!(BufferKind::Storage.memory_location(), MemoryLocation::GpuOnly);
    }

    #[test]
    fn test_storage_kind_is_vertex_input() {
        assert!(
            BufferKind::Storage
                .usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
    }

    #[test]
    fn test_host_written_kinds_are_mapped() {
        assert_eq!(
            BufferKind::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferKind::Staging.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferKind::Uniform.usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            BufferKind::Staging.usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }
}
