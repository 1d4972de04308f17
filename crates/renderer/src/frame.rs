//! Frame tick counter and the per-frame info handed to strategies.

use ash::vk;

/// Default number of frames that may be in flight simultaneously.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Monotonic tick counter selecting the current frame slot.
///
/// The current slot is always `tick % frames`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    tick: u64,
    frames: usize,
}

impl FrameCounter {
    /// Creates a counter over `frames` slots. A zero count is treated as one.
    pub fn new(frames: usize) -> Self {
        Self {
            tick: 0,
            frames: frames.max(1),
        }
    }

    /// Number of completed presentation attempts.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Index of the frame slot in use for the current tick.
    #[inline]
    pub fn current_slot(&self) -> usize {
        (self.tick % self.frames as u64) as usize
    }

    /// Advance to the next tick.
    pub fn advance(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES_IN_FLIGHT)
    }
}

/// Everything a strategy may need to know about the frame being built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Frame slot index, `tick % frames_in_flight`.
    pub slot: usize,
    pub tick: u64,
    /// Swapchain image the graphics pass renders into.
    pub image_index: u32,
    /// Current swapchain extent, used for dynamic viewport and scissor.
    pub extent: vk::Extent2D,
    /// Seconds since the previous tick.
    pub delta_secs: f32,
    /// Seconds since the orchestrator started.
    pub elapsed_secs: f32,
}
