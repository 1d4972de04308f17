//! The per-frame state machine.
//!
//! Every [`FrameOrchestrator::tick`] runs the same strictly ordered steps
//! against the current frame slot (`tick % frames_in_flight`):
//!
//! 1. wait for the slot's `InFlight` fence
//! 2. acquire a swapchain image (out-of-date aborts the tick)
//! 3. let the active strategy update its per-frame state
//! 4. if the strategy needs it, record and submit the compute pass
//! 5. reset `InFlight`, record the render pass and submit it
//! 6. present
//! 7. advance the tick
//!
//! Swapchain recreation happens at most once per tick: after present when
//! anything asked for it, or instead of the whole tick when acquire found
//! the swapchain out of date.

use ash::vk;
use frameloop_core::Timer;
use frameloop_rhi::{RhiError, RhiResult};
use tracing::{debug, error, info, warn};

use crate::backend::{AcquireOutcome, FenceKind, FrameBackend, RecreateOutcome, SubmitDesc};
use crate::frame::{FrameCounter, FrameInfo};
use crate::strategy::{PipelineTarget, RenderStrategy};

/// What a call to [`FrameOrchestrator::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and presented. `recreated` is set when the
    /// swapchain was rebuilt right after present.
    Presented { recreated: bool },
    /// Acquire reported an out-of-date swapchain. Nothing was submitted and
    /// the tick did not advance.
    Skipped,
    /// The framebuffer is zero-sized. No GPU work was done; the caller should
    /// wait for a resize event before ticking again.
    Suspended,
}

/// Drives frames through a [`FrameBackend`] using the active strategy.
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    strategies: Vec<Box<dyn RenderStrategy<B>>>,
    active: usize,
    counter: FrameCounter,
    timer: Timer,
    framebuffer_extent: vk::Extent2D,
    target: PipelineTarget,
    /// The platform reported a resize since the last recreation.
    resize_pending: bool,
    /// A recreation was requested but could not happen yet.
    recreate_pending: bool,
    suspended: bool,
    shut_down: bool,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    /// Takes ownership of the backend and strategies, then initializes every
    /// strategy and builds its pipelines against the current render pass.
    ///
    /// # Errors
    ///
    /// Fails if `strategies` is empty or any strategy fails to initialize.
    pub fn new(
        backend: B,
        mut strategies: Vec<Box<dyn RenderStrategy<B>>>,
        framebuffer_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        if strategies.is_empty() {
            return Err(RhiError::InvalidHandle(
                "At least one render strategy is required".to_string(),
            ));
        }

        let target = backend.pipeline_target();
        for strategy in strategies.iter_mut() {
            strategy.initialize(&backend)?;
            strategy.rebuild_pipeline(&target)?;
            debug!("Render strategy '{}' initialized", strategy.name());
        }

        let counter = FrameCounter::new(backend.frames_in_flight());

        info!(
            "Frame orchestrator ready: {} strategies, {} frame(s) in flight",
            strategies.len(),
            counter.frames()
        );

        Ok(Self {
            backend,
            strategies,
            active: 0,
            counter,
            timer: Timer::new(),
            framebuffer_extent,
            target,
            resize_pending: false,
            // No swapchain could be created for a zero-sized surface.
            recreate_pending: is_zero(target.extent),
            suspended: false,
            shut_down: false,
        })
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Any error is fatal. Out-of-date and suboptimal swapchains, resizes and
    /// zero-sized framebuffers are handled here and never returned.
    pub fn tick(&mut self) -> RhiResult<FrameStatus> {
        if self.recreate_pending || is_zero(self.framebuffer_extent) {
            if !self.recreate_swapchain()? {
                self.suspended = true;
                return Ok(FrameStatus::Suspended);
            }
        }

        if self.suspended {
            self.suspended = false;
            debug!("Resuming frame loop");
        }

        let slot = self.counter.current_slot();
        let strategy = self.strategies[self.active].as_mut();
        let backend = &mut self.backend;

        // 1. The slot's previous graphics submission must be done before any
        //    of its resources are touched.
        backend.wait_for_fence(slot, FenceKind::InFlight)?;

        // 2.
        let (image_index, suboptimal) = match backend.acquire_image(slot)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date at acquire, recreating");
                self.recreate_swapchain()?;
                return Ok(FrameStatus::Skipped);
            }
        };

        // 3.
        let frame = FrameInfo {
            slot,
            tick: self.counter.tick(),
            image_index,
            extent: self.target.extent,
            delta_secs: self.timer.delta_secs(),
            elapsed_secs: self.timer.elapsed_secs(),
        };
        strategy.step_update(&frame)?;

        // 4. The compute semaphore is only waited on when it was signaled
        //    this tick.
        let compute_stage = if strategy.needs_compute() {
            backend.wait_for_fence(slot, FenceKind::ComputeInFlight)?;
            backend.reset_fence(slot, FenceKind::ComputeInFlight)?;

            let cmd = backend.begin_compute(slot)?;
            strategy.record_compute(&cmd, &frame)?;
            backend.end_compute(slot)?;

            backend.submit(&SubmitDesc::compute(slot))?;
            Some(strategy.compute_consuming_stage())
        } else {
            None
        };

        // 5.
        backend.reset_fence(slot, FenceKind::InFlight)?;

        let cmd = backend.begin_graphics(slot, image_index)?;
        strategy.record_draw(&cmd, &frame)?;
        backend.end_graphics(slot)?;

        backend.submit(&SubmitDesc::graphics(slot, compute_stage))?;

        // 6.
        let present = backend.present(slot, image_index)?;

        // 7.
        self.counter.advance();

        let recreate = suboptimal || present.needs_recreate() || self.resize_pending;
        if recreate {
            debug!(
                "Recreating swapchain after present (suboptimal: {}, present: {:?}, resized: {})",
                suboptimal, present, self.resize_pending
            );
            self.recreate_swapchain()?;
        }

        Ok(FrameStatus::Presented {
            recreated: recreate && !self.recreate_pending,
        })
    }

    /// Records a new framebuffer size reported by the platform.
    ///
    /// The swapchain is rebuilt after the next present, or before the next
    /// acquire if the loop is suspended.
    pub fn notify_resized(&mut self, framebuffer_extent: vk::Extent2D) {
        if framebuffer_extent != self.framebuffer_extent {
            debug!(
                "Framebuffer resized: {}x{}",
                framebuffer_extent.width, framebuffer_extent.height
            );
        }
        self.framebuffer_extent = framebuffer_extent;
        self.resize_pending = true;
    }

    /// Returns `false` when nothing could be created for a zero-sized
    /// framebuffer.
    fn recreate_swapchain(&mut self) -> RhiResult<bool> {
        if is_zero(self.framebuffer_extent) {
            if !self.recreate_pending {
                info!("Framebuffer is zero-sized, deferring swapchain recreation");
            }
            self.recreate_pending = true;
            return Ok(false);
        }

        match self.backend.recreate_swapchain(self.framebuffer_extent)? {
            RecreateOutcome::Deferred => {
                if !self.recreate_pending {
                    info!("Surface extent is zero-sized, deferring swapchain recreation");
                }
                self.recreate_pending = true;
                Ok(false)
            }
            RecreateOutcome::Rebuilt { format_changed } => {
                self.recreate_pending = false;
                self.resize_pending = false;
                self.target = self.backend.pipeline_target();

                if format_changed {
                    info!(
                        "Surface format changed to {:?}, rebuilding pipelines",
                        self.target.color_format
                    );
                    for strategy in self.strategies.iter_mut() {
                        strategy.rebuild_pipeline(&self.target)?;
                    }
                }
                Ok(true)
            }
        }
    }

    // =========================================================================
    // Strategy selection
    // =========================================================================

    /// Makes the strategy at `index` active from the next tick on.
    ///
    /// Returns `false` if there is no such strategy.
    pub fn select_strategy(&mut self, index: usize) -> bool {
        if index >= self.strategies.len() {
            warn!(
                "No render strategy at index {} ({} registered)",
                index,
                self.strategies.len()
            );
            return false;
        }

        if index != self.active {
            self.active = index;
            info!("Switched to render strategy '{}'", self.active_strategy_name());
        }
        true
    }

    /// Selects a strategy by name. Returns `false` if none matches.
    pub fn select_strategy_by_name(&mut self, name: &str) -> bool {
        match self.strategies.iter().position(|s| s.name() == name) {
            Some(index) => self.select_strategy(index),
            None => {
                warn!("Unknown render strategy '{}'", name);
                false
            }
        }
    }

    /// Advances to the next strategy, wrapping around.
    pub fn cycle_strategy(&mut self) {
        let next = (self.active + 1) % self.strategies.len();
        self.select_strategy(next);
    }

    pub fn active_strategy(&self) -> usize {
        self.active
    }

    pub fn active_strategy_name(&self) -> &str {
        self.strategies[self.active].name()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Number of completed presentation attempts.
    pub fn tick_count(&self) -> u64 {
        self.counter.tick()
    }

    pub fn current_slot(&self) -> usize {
        self.counter.current_slot()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        self.framebuffer_extent
    }

    pub fn pipeline_target(&self) -> PipelineTarget {
        self.target
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Waits for the device to go idle and shuts every strategy down.
    ///
    /// Runs once; later calls do nothing.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        self.backend.wait_idle()?;
        for strategy in self.strategies.iter_mut() {
            strategy.shutdown(&self.backend);
            debug!("Render strategy '{}' shut down", strategy.name());
        }

        info!("Frame orchestrator shut down after {} ticks", self.counter.tick());
        Ok(())
    }
}

impl<B: FrameBackend> Drop for FrameOrchestrator<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Frame orchestrator shutdown failed: {}", e);
        }
    }
}

fn is_zero(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
