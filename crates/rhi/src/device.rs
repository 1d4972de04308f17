//! Vulkan logical device and queue management.
//!
//! Creates the `VkDevice` with the swapchain extension, retrieves the
//! combined graphics+compute queue and the present queue, and sets up the
//! `gpu-allocator` allocator used for attachment and buffer memory.

use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// Shared across the renderer as `Arc<Device>`. Every RAII wrapper in this
/// crate holds a clone so the device outlives the objects created from it.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    allocator: Mutex<Option<Allocator>>,
    graphics_compute_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    graphics_compute_family: u32,
    msaa_sample_counts: vk::SampleCountFlags,
}

impl Device {
    /// Creates the logical device for a selected physical device.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue families are incomplete, device creation
    /// fails, or the allocator cannot be initialized.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_compute_family), Some(present_family)) = (
            queue_families.graphics_compute_family,
            queue_families.present_family,
        ) else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default();

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_compute_queue = unsafe { device.get_device_queue(graphics_compute_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved: graphics+compute family {}, present family {}",
            graphics_compute_family, present_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: Mutex::new(Some(allocator)),
            graphics_compute_queue,
            present_queue,
            queue_families,
            graphics_compute_family,
            msaa_sample_counts: physical_device_info.msaa_sample_counts(),
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Queue used for both graphics and compute submissions.
    #[inline]
    pub fn graphics_compute_queue(&self) -> vk::Queue {
        self.graphics_compute_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Family index of [`graphics_compute_queue`](Self::graphics_compute_queue).
    #[inline]
    pub fn graphics_compute_family(&self) -> u32 {
        self.graphics_compute_family
    }

    /// Sample counts supported for both color and depth attachments.
    #[inline]
    pub fn msaa_sample_counts(&self) -> vk::SampleCountFlags {
        self.msaa_sample_counts
    }

    /// Locks the GPU memory allocator.
    ///
    /// The allocator is `None` only while the device is being dropped.
    pub fn allocator(&self) -> std::sync::MutexGuard<'_, Option<Allocator>> {
        match self.allocator.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Allocates memory through the shared allocator.
    ///
    /// # Errors
    ///
    /// Returns an allocator error, or [`RhiError::InvalidHandle`] if the
    /// allocator has already been released.
    pub fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> Result<Allocation, RhiError> {
        let mut guard = self.allocator();
        let allocator = guard
            .as_mut()
            .ok_or_else(|| RhiError::InvalidHandle("allocator already released".to_string()))?;
        Ok(allocator.allocate(desc)?)
    }

    /// Returns an allocation to the shared allocator. Failures are logged.
    pub fn free_allocation(&self, allocation: Allocation) {
        let mut guard = self.allocator();
        if let Some(allocator) = guard.as_mut()
            && let Err(e) = allocator.free(allocation)
        {
            tracing::error!("Failed to free allocation: {:?}", e);
        }
    }

    /// Blocks until every queue on the device is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails (typically device loss).
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits work to the graphics+compute queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded, and `fence` (if not null)
    /// must be unsignaled and not already pending.
    pub unsafe fn submit(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.graphics_compute_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator must release its memory blocks before the device goes away
            drop(self.allocator().take());

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, the remaining fields are plain handles or
// Copy data, and the allocator sits behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert_eq!(DEVICE_EXTENSIONS, &[ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
