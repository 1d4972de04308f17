//! Synchronization primitives and the per-frame slot pool.
//!
//! - [`Semaphore`] orders work between queue operations on the GPU
//! - [`Fence`] lets the CPU wait for GPU work to finish
//! - [`FrameSlot`] groups the five objects one frame in flight needs
//! - [`FrameSyncPool`] owns a fixed ring of slots
//!
//! The pool only creates, looks up and destroys. The order in which the
//! objects are waited on, reset and signaled belongs to the frame loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use frameloop_rhi::device::Device;
//! use frameloop_rhi::sync::FrameSyncPool;
//!
//! # fn example(device: Arc<Device>) -> Result<(), frameloop_rhi::RhiError> {
//! let pool = FrameSyncPool::allocate(device, 2)?;
//!
//! let slot = pool.slot(0);
//! // Fences start signaled, so the first wait returns immediately
//! slot.in_flight().wait(u64::MAX)?;
//! slot.in_flight().reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan binary semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new unsignaled semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// A fence that will be waited on before anything ever signals it must be
    /// created with `signaled = true`, otherwise the first wait never returns.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(TIMEOUT)` on timeout, or the error from the wait.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects for one frame in flight.
///
/// Semaphores start unsignaled, fences start signaled.
pub struct FrameSlot {
    /// Signaled by image acquisition, waited on by the graphics submission.
    image_available: Semaphore,
    /// Signaled by the graphics submission, waited on by present.
    render_finished: Semaphore,
    /// Guards reuse of the slot's graphics command buffer.
    in_flight: Fence,
    /// Signaled by the compute submission. Only waited on in ticks where
    /// compute actually ran.
    compute_finished: Semaphore,
    /// Guards reuse of the slot's compute command buffer.
    compute_in_flight: Fence,
}

impl FrameSlot {
    /// Creates the five objects of a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if any object cannot be created. Objects created
    /// before the failure are released.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
            compute_finished: Semaphore::new(device.clone())?,
            compute_in_flight: Fence::new(device, true)?,
        })
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    #[inline]
    pub fn compute_finished(&self) -> &Semaphore {
        &self.compute_finished
    }

    #[inline]
    pub fn compute_in_flight(&self) -> &Fence {
        &self.compute_in_flight
    }
}

/// Fixed-size ring of [`FrameSlot`]s.
///
/// The pool is sized once; slots are never added or removed afterwards.
pub struct FrameSyncPool {
    slots: Vec<FrameSlot>,
}

impl FrameSyncPool {
    /// Creates `count` independent slots.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero-sized pool, or the
    /// error of the first object that fails to be created.
    pub fn allocate(device: Arc<Device>, count: usize) -> RhiResult<Self> {
        if count == 0 {
            return Err(RhiError::InvalidHandle(
                "frame sync pool needs at least one slot".to_string(),
            ));
        }

        let slots = (0..count)
            .map(|_| FrameSlot::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Allocated {} frame sync slot(s)", slots.len());

        Ok(Self { slots })
    }

    /// Number of slots, i.e. the maximum number of frames in flight.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`. Callers index with `tick % len()`.
    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }
}

impl Drop for FrameSyncPool {
    fn drop(&mut self) {
        debug!("Releasing {} frame sync slot(s)", self.slots.len());
    }
}
