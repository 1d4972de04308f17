//! Protocol tests for the frame orchestrator.
//!
//! A recording backend and recording strategies share one call log, so the
//! tests can assert the exact interleaving of GPU calls and strategy
//! callbacks without a GPU.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use ash::vk;
use frameloop_renderer::{
    AcquireOutcome, FenceKind, FrameBackend, FrameInfo, FrameOrchestrator, FrameStatus,
    PipelineTarget, PresentOutcome, QueueKind, RecreateOutcome, RenderStrategy, SemaphoreKind,
    SubmitDesc,
};
use frameloop_rhi::{RhiError, RhiResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    WaitFence(usize, FenceKind),
    ResetFence(usize, FenceKind),
    Acquire(usize),
    BeginCompute(usize),
    EndCompute(usize),
    BeginGraphics(usize, u32),
    EndGraphics(usize),
    Submit(SubmitDesc),
    Present(usize, u32),
    Recreate(vk::Extent2D),
    WaitIdle,
    Initialize(&'static str),
    RebuildPipeline(&'static str, vk::Format),
    StepUpdate(&'static str, usize),
    RecordCompute(&'static str, usize),
    RecordDraw(&'static str, usize),
    Shutdown(&'static str),
}

#[derive(Default)]
struct State {
    log: Vec<Call>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    recreate_script: VecDeque<RecreateOutcome>,
    present_error: Option<vk::Result>,
    next_image: u32,
    /// `delta_secs` seen by each `step_update`.
    deltas: Vec<f32>,
    format: vk::Format,
    extent: vk::Extent2D,
}

type Shared = Rc<RefCell<State>>;

fn shared() -> Shared {
    Rc::new(RefCell::new(State {
        format: vk::Format::B8G8R8A8_SRGB,
        extent: extent(800, 600),
        ..State::default()
    }))
}

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MockCommandBuffer {
    queue: QueueKind,
    slot: usize,
}

struct MockBackend {
    state: Shared,
    frames: usize,
    /// Fences signal as soon as work is submitted.
    fences: HashMap<(usize, FenceKind), bool>,
}

impl MockBackend {
    fn new(state: Shared, frames: usize) -> Self {
        Self {
            state,
            frames,
            fences: HashMap::new(),
        }
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().log.push(call);
    }
}

const IMAGE_COUNT: u32 = 3;

impl FrameBackend for MockBackend {
    type CommandBuffer = MockCommandBuffer;

    fn frames_in_flight(&self) -> usize {
        self.frames
    }

    fn pipeline_target(&self) -> PipelineTarget {
        let state = self.state.borrow();
        PipelineTarget {
            render_pass: vk::RenderPass::null(),
            color_format: state.format,
            depth_format: vk::Format::D32_SFLOAT,
            samples: vk::SampleCountFlags::TYPE_4,
            extent: state.extent,
        }
    }

    fn wait_for_fence(&mut self, slot: usize, fence: FenceKind) -> RhiResult<()> {
        let signaled = *self.fences.get(&(slot, fence)).unwrap_or(&true);
        assert!(signaled, "waited on a fence that can never signal");
        self.log(Call::WaitFence(slot, fence));
        Ok(())
    }

    fn reset_fence(&mut self, slot: usize, fence: FenceKind) -> RhiResult<()> {
        self.fences.insert((slot, fence), false);
        self.log(Call::ResetFence(slot, fence));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        self.log(Call::Acquire(slot));
        let mut state = self.state.borrow_mut();
        if let Some(outcome) = state.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let image_index = state.next_image;
        state.next_image = (state.next_image + 1) % IMAGE_COUNT;
        Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal: false,
        })
    }

    fn begin_compute(&mut self, slot: usize) -> RhiResult<MockCommandBuffer> {
        self.log(Call::BeginCompute(slot));
        Ok(MockCommandBuffer {
            queue: QueueKind::Compute,
            slot,
        })
    }

    fn end_compute(&mut self, slot: usize) -> RhiResult<()> {
        self.log(Call::EndCompute(slot));
        Ok(())
    }

    fn begin_graphics(&mut self, slot: usize, image_index: u32) -> RhiResult<MockCommandBuffer> {
        self.log(Call::BeginGraphics(slot, image_index));
        Ok(MockCommandBuffer {
            queue: QueueKind::Graphics,
            slot,
        })
    }

    fn end_graphics(&mut self, slot: usize) -> RhiResult<()> {
        self.log(Call::EndGraphics(slot));
        Ok(())
    }

    fn submit(&mut self, submit: &SubmitDesc) -> RhiResult<()> {
        self.fences.insert((submit.slot, submit.fence), true);
        self.log(Call::Submit(submit.clone()));
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        self.log(Call::Present(slot, image_index));
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.present_error.take() {
            return Err(RhiError::VulkanError(error));
        }
        Ok(state
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn recreate_swapchain(&mut self, framebuffer_extent: vk::Extent2D) -> RhiResult<RecreateOutcome> {
        self.log(Call::Recreate(framebuffer_extent));
        let mut state = self.state.borrow_mut();
        let outcome = state
            .recreate_script
            .pop_front()
            .unwrap_or(RecreateOutcome::Rebuilt {
                format_changed: false,
            });
        if let RecreateOutcome::Rebuilt { format_changed } = outcome {
            state.extent = framebuffer_extent;
            if format_changed {
                state.format = vk::Format::B8G8R8A8_UNORM;
            }
        }
        Ok(outcome)
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.log(Call::WaitIdle);
        Ok(())
    }
}

struct MockStrategy {
    name: &'static str,
    compute_stage: Option<vk::PipelineStageFlags>,
    state: Shared,
}

impl MockStrategy {
    fn graphics(name: &'static str, state: &Shared) -> Box<dyn RenderStrategy<MockBackend>> {
        Box::new(Self {
            name,
            compute_stage: None,
            state: state.clone(),
        })
    }

    fn compute(
        name: &'static str,
        stage: vk::PipelineStageFlags,
        state: &Shared,
    ) -> Box<dyn RenderStrategy<MockBackend>> {
        Box::new(Self {
            name,
            compute_stage: Some(stage),
            state: state.clone(),
        })
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().log.push(call);
    }
}

impl RenderStrategy<MockBackend> for MockStrategy {
    fn name(&self) -> &str {
        self.name
    }

    fn needs_compute(&self) -> bool {
        self.compute_stage.is_some()
    }

    fn compute_consuming_stage(&self) -> vk::PipelineStageFlags {
        self.compute_stage
            .unwrap_or(vk::PipelineStageFlags::VERTEX_INPUT)
    }

    fn initialize(&mut self, _backend: &MockBackend) -> RhiResult<()> {
        self.log(Call::Initialize(self.name));
        Ok(())
    }

    fn rebuild_pipeline(&mut self, target: &PipelineTarget) -> RhiResult<()> {
        self.log(Call::RebuildPipeline(self.name, target.color_format));
        Ok(())
    }

    fn step_update(&mut self, frame: &FrameInfo) -> RhiResult<()> {
        self.log(Call::StepUpdate(self.name, frame.slot));
        self.state.borrow_mut().deltas.push(frame.delta_secs);
        Ok(())
    }

    fn record_compute(&mut self, cmd: &MockCommandBuffer, frame: &FrameInfo) -> RhiResult<()> {
        assert_eq!(cmd.queue, QueueKind::Compute);
        assert_eq!(cmd.slot, frame.slot);
        self.log(Call::RecordCompute(self.name, frame.slot));
        Ok(())
    }

    fn record_draw(&mut self, cmd: &MockCommandBuffer, frame: &FrameInfo) -> RhiResult<()> {
        assert_eq!(cmd.queue, QueueKind::Graphics);
        assert_eq!(cmd.slot, frame.slot);
        self.log(Call::RecordDraw(self.name, frame.slot));
        Ok(())
    }

    fn shutdown(&mut self, _backend: &MockBackend) {
        self.log(Call::Shutdown(self.name));
    }
}

fn orchestrator(
    state: &Shared,
    frames: usize,
    strategies: Vec<Box<dyn RenderStrategy<MockBackend>>>,
) -> FrameOrchestrator<MockBackend> {
    let orchestrator = FrameOrchestrator::new(
        MockBackend::new(state.clone(), frames),
        strategies,
        extent(800, 600),
    )
    .expect("orchestrator");
    state.borrow_mut().log.clear();
    orchestrator
}

fn take_log(state: &Shared) -> Vec<Call> {
    std::mem::take(&mut state.borrow_mut().log)
}

fn count(log: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
    log.iter().filter(|call| pred(call)).count()
}

fn is_recreate(call: &Call) -> bool {
    matches!(call, Call::Recreate(_))
}

fn is_submit(call: &Call) -> bool {
    matches!(call, Call::Submit(_))
}

fn is_present(call: &Call) -> bool {
    matches!(call, Call::Present(..))
}

// ============================================================================
// Tick ordering
// ============================================================================

#[test]
fn test_graphics_only_tick_order() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);

    let status = orch.tick().unwrap();
    assert_eq!(status, FrameStatus::Presented { recreated: false });

    assert_eq!(
        take_log(&state),
        vec![
            Call::WaitFence(0, FenceKind::InFlight),
            Call::Acquire(0),
            Call::StepUpdate("draw", 0),
            Call::ResetFence(0, FenceKind::InFlight),
            Call::BeginGraphics(0, 0),
            Call::RecordDraw("draw", 0),
            Call::EndGraphics(0),
            Call::Submit(SubmitDesc::graphics(0, None)),
            Call::Present(0, 0),
        ]
    );
    assert_eq!(orch.tick_count(), 1);
}

#[test]
fn test_compute_tick_order() {
    let state = shared();
    let mut orch = orchestrator(
        &state,
        2,
        vec![MockStrategy::compute(
            "sim",
            vk::PipelineStageFlags::DRAW_INDIRECT,
            &state,
        )],
    );

    orch.tick().unwrap();

    assert_eq!(
        take_log(&state),
        vec![
            Call::WaitFence(0, FenceKind::InFlight),
            Call::Acquire(0),
            Call::StepUpdate("sim", 0),
            Call::WaitFence(0, FenceKind::ComputeInFlight),
            Call::ResetFence(0, FenceKind::ComputeInFlight),
            Call::BeginCompute(0),
            Call::RecordCompute("sim", 0),
            Call::EndCompute(0),
            Call::Submit(SubmitDesc::compute(0)),
            Call::ResetFence(0, FenceKind::InFlight),
            Call::BeginGraphics(0, 0),
            Call::RecordDraw("sim", 0),
            Call::EndGraphics(0),
            Call::Submit(SubmitDesc::graphics(
                0,
                Some(vk::PipelineStageFlags::DRAW_INDIRECT)
            )),
            Call::Present(0, 0),
        ]
    );
}

#[test]
fn test_slots_rotate_modulo_frames_in_flight() {
    let state = shared();
    let mut orch = orchestrator(&state, 3, vec![MockStrategy::graphics("draw", &state)]);

    for _ in 0..7 {
        orch.tick().unwrap();
    }

    let slots: Vec<usize> = take_log(&state)
        .into_iter()
        .filter_map(|call| match call {
            Call::Acquire(slot) => Some(slot),
            _ => None,
        })
        .collect();
    assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(orch.current_slot(), 1);
}

#[test]
fn test_command_buffers_rerecorded_only_after_fence_wait() {
    for frames in 1..=3 {
        let state = shared();
        let mut orch = orchestrator(
            &state,
            frames,
            vec![MockStrategy::compute(
                "sim",
                vk::PipelineStageFlags::VERTEX_INPUT,
                &state,
            )],
        );

        for tick in 0..12 {
            if tick == 5 {
                state
                    .borrow_mut()
                    .acquire_script
                    .push_back(AcquireOutcome::OutOfDate);
            }
            orch.tick().unwrap();
        }

        // Per (slot, fence): a wait must be observed between two recordings.
        let mut observed: HashMap<(usize, FenceKind), bool> = HashMap::new();
        for call in take_log(&state) {
            match call {
                Call::WaitFence(slot, fence) => {
                    observed.insert((slot, fence), true);
                }
                Call::BeginGraphics(slot, _) => {
                    let key = (slot, FenceKind::InFlight);
                    assert_eq!(observed.get(&key), Some(&true), "frames={frames}");
                    observed.insert(key, false);
                }
                Call::BeginCompute(slot) => {
                    let key = (slot, FenceKind::ComputeInFlight);
                    assert_eq!(observed.get(&key), Some(&true), "frames={frames}");
                    observed.insert(key, false);
                }
                _ => {}
            }
        }
    }
}

// ============================================================================
// Compute semaphore edge
// ============================================================================

#[test]
fn test_no_compute_wait_when_compute_disabled() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);

    for _ in 0..6 {
        orch.tick().unwrap();
    }

    let log = take_log(&state);
    let graphics_submits: Vec<&SubmitDesc> = log
        .iter()
        .filter_map(|call| match call {
            Call::Submit(submit) if submit.queue == QueueKind::Graphics => Some(submit),
            _ => None,
        })
        .collect();

    assert_eq!(graphics_submits.len(), 6);
    for submit in graphics_submits {
        assert!(submit.waits_on(SemaphoreKind::ImageAvailable));
        assert!(!submit.waits_on(SemaphoreKind::ComputeFinished));
    }
    assert_eq!(count(&log, |c| matches!(c, Call::BeginCompute(_))), 0);
    assert_eq!(
        count(&log, |c| matches!(c, Call::WaitFence(_, FenceKind::ComputeInFlight))),
        0
    );
}

#[test]
fn test_strategy_switch_changes_compute_phase() {
    let state = shared();
    let mut orch = orchestrator(
        &state,
        2,
        vec![
            MockStrategy::graphics("draw", &state),
            MockStrategy::compute("sim", vk::PipelineStageFlags::VERTEX_INPUT, &state),
        ],
    );

    orch.tick().unwrap();
    assert!(orch.select_strategy(1));
    orch.tick().unwrap();
    assert!(orch.select_strategy_by_name("draw"));
    orch.tick().unwrap();

    let submits: Vec<SubmitDesc> = take_log(&state)
        .into_iter()
        .filter_map(|call| match call {
            Call::Submit(submit) => Some(submit),
            _ => None,
        })
        .collect();

    assert_eq!(
        submits,
        vec![
            SubmitDesc::graphics(0, None),
            SubmitDesc::compute(1),
            SubmitDesc::graphics(1, Some(vk::PipelineStageFlags::VERTEX_INPUT)),
            SubmitDesc::graphics(0, None),
        ]
    );
}

// ============================================================================
// Recoverable surface conditions
// ============================================================================

#[test]
fn test_acquire_out_of_date_skips_tick() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    state
        .borrow_mut()
        .acquire_script
        .push_back(AcquireOutcome::OutOfDate);

    let status = orch.tick().unwrap();
    assert_eq!(status, FrameStatus::Skipped);
    assert_eq!(orch.tick_count(), 0);

    let log = take_log(&state);
    assert_eq!(
        log,
        vec![
            Call::WaitFence(0, FenceKind::InFlight),
            Call::Acquire(0),
            Call::Recreate(extent(800, 600)),
        ]
    );
    assert_eq!(count(&log, is_submit), 0);
    assert_eq!(count(&log, is_present), 0);

    // The retry uses the same slot against the new chain.
    orch.tick().unwrap();
    let log = take_log(&state);
    assert_eq!(log[0], Call::WaitFence(0, FenceKind::InFlight));
    assert_eq!(log[1], Call::Acquire(0));
    assert_eq!(count(&log, is_recreate), 0);
}

#[test]
fn test_suboptimal_present_recreates_once_after_present() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    state
        .borrow_mut()
        .present_script
        .push_back(PresentOutcome::Suboptimal);

    let status = orch.tick().unwrap();
    assert_eq!(status, FrameStatus::Presented { recreated: true });
    assert_eq!(orch.tick_count(), 1);

    let log = take_log(&state);
    assert_eq!(count(&log, is_present), 1);
    assert_eq!(count(&log, is_recreate), 1);
    assert!(is_present(&log[log.len() - 2]));
    assert!(is_recreate(&log[log.len() - 1]));
}

#[test]
fn test_suboptimal_acquire_alone_recreates_once_after_present() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    state
        .borrow_mut()
        .acquire_script
        .push_back(AcquireOutcome::Ready {
            image_index: 1,
            suboptimal: true,
        });

    let status = orch.tick().unwrap();
    assert_eq!(status, FrameStatus::Presented { recreated: true });
    assert_eq!(orch.tick_count(), 1);

    let log = take_log(&state);
    assert_eq!(count(&log, is_present), 1);
    assert_eq!(count(&log, is_recreate), 1);
    assert_eq!(log[log.len() - 2], Call::Present(0, 1));
    assert_eq!(log[log.len() - 1], Call::Recreate(extent(800, 600)));

    // The flag is consumed by that one recreation.
    assert_eq!(
        orch.tick().unwrap(),
        FrameStatus::Presented { recreated: false }
    );
    assert_eq!(count(&take_log(&state), is_recreate), 0);
}

#[test]
fn test_suboptimal_and_resize_recreate_exactly_once() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    {
        let mut s = state.borrow_mut();
        s.acquire_script.push_back(AcquireOutcome::Ready {
            image_index: 2,
            suboptimal: true,
        });
        s.present_script.push_back(PresentOutcome::Suboptimal);
    }
    orch.notify_resized(extent(1024, 768));

    orch.tick().unwrap();

    let log = take_log(&state);
    assert_eq!(count(&log, is_recreate), 1);
    assert_eq!(log.last(), Some(&Call::Recreate(extent(1024, 768))));
    assert!(log.contains(&Call::Present(0, 2)));

    // Nothing left pending.
    orch.tick().unwrap();
    assert_eq!(count(&take_log(&state), is_recreate), 0);
    assert_eq!(orch.pipeline_target().extent, extent(1024, 768));
}

#[test]
fn test_present_out_of_date_recreates_after_present() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    state
        .borrow_mut()
        .present_script
        .push_back(PresentOutcome::OutOfDate);

    assert_eq!(
        orch.tick().unwrap(),
        FrameStatus::Presented { recreated: true }
    );
    assert_eq!(orch.tick_count(), 1);
    assert_eq!(count(&take_log(&state), is_recreate), 1);
}

#[test]
fn test_zero_size_framebuffer_suspends_without_touching_sync() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);

    orch.notify_resized(extent(0, 0));
    for _ in 0..3 {
        assert_eq!(orch.tick().unwrap(), FrameStatus::Suspended);
    }
    assert!(orch.is_suspended());
    assert!(take_log(&state).is_empty());

    orch.notify_resized(extent(640, 480));
    assert_eq!(
        orch.tick().unwrap(),
        FrameStatus::Presented { recreated: false }
    );
    assert!(!orch.is_suspended());

    let log = take_log(&state);
    assert_eq!(log[0], Call::Recreate(extent(640, 480)));
    assert_eq!(log[1], Call::WaitFence(0, FenceKind::InFlight));
    assert_eq!(count(&log, is_recreate), 1);
}

#[test]
fn test_delta_after_suspension_covers_suspended_time() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    orch.tick().unwrap();

    orch.notify_resized(extent(0, 0));
    assert_eq!(orch.tick().unwrap(), FrameStatus::Suspended);
    std::thread::sleep(std::time::Duration::from_millis(400));
    orch.notify_resized(extent(800, 600));
    orch.tick().unwrap();

    let deltas = state.borrow().deltas.clone();
    assert_eq!(deltas.len(), 2);
    assert!(deltas[1] >= 0.4, "delta was {}", deltas[1]);
}

#[test]
fn test_deferred_recreation_retried_before_next_acquire() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    {
        let mut s = state.borrow_mut();
        s.acquire_script.push_back(AcquireOutcome::OutOfDate);
        s.recreate_script.push_back(RecreateOutcome::Deferred);
        s.recreate_script.push_back(RecreateOutcome::Deferred);
    }

    assert_eq!(orch.tick().unwrap(), FrameStatus::Skipped);
    assert_eq!(orch.tick().unwrap(), FrameStatus::Suspended);
    assert_eq!(
        orch.tick().unwrap(),
        FrameStatus::Presented { recreated: false }
    );

    let log = take_log(&state);
    assert_eq!(count(&log, is_recreate), 3);
    assert_eq!(count(&log, |c| matches!(c, Call::Acquire(_))), 2);
    assert_eq!(count(&log, is_present), 1);
}

#[test]
fn test_format_change_rebuilds_every_pipeline() {
    let state = shared();
    let mut orch = orchestrator(
        &state,
        2,
        vec![
            MockStrategy::graphics("draw", &state),
            MockStrategy::compute("sim", vk::PipelineStageFlags::VERTEX_INPUT, &state),
        ],
    );
    {
        let mut s = state.borrow_mut();
        s.present_script.push_back(PresentOutcome::Suboptimal);
        s.recreate_script.push_back(RecreateOutcome::Rebuilt {
            format_changed: true,
        });
    }

    orch.tick().unwrap();

    let rebuilds: Vec<Call> = take_log(&state)
        .into_iter()
        .filter(|call| matches!(call, Call::RebuildPipeline(..)))
        .collect();
    assert_eq!(
        rebuilds,
        vec![
            Call::RebuildPipeline("draw", vk::Format::B8G8R8A8_UNORM),
            Call::RebuildPipeline("sim", vk::Format::B8G8R8A8_UNORM),
        ]
    );
}

#[test]
fn test_extent_only_recreation_keeps_pipelines() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);

    orch.notify_resized(extent(1280, 720));
    orch.tick().unwrap();

    let log = take_log(&state);
    assert_eq!(count(&log, is_recreate), 1);
    assert_eq!(count(&log, |c| matches!(c, Call::RebuildPipeline(..))), 0);
}

#[test]
fn test_fatal_present_error_propagates() {
    let state = shared();
    let mut orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    state.borrow_mut().present_error = Some(vk::Result::ERROR_DEVICE_LOST);

    let result = orch.tick();
    assert!(matches!(
        result,
        Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
    ));
    assert_eq!(count(&take_log(&state), is_recreate), 0);
}

// ============================================================================
// Lifecycle and selection
// ============================================================================

#[test]
fn test_new_initializes_and_builds_every_strategy() {
    let state = shared();
    let _orch = FrameOrchestrator::new(
        MockBackend::new(state.clone(), 2),
        vec![
            MockStrategy::graphics("draw", &state),
            MockStrategy::graphics("other", &state),
        ],
        extent(800, 600),
    )
    .unwrap();

    assert_eq!(
        take_log(&state),
        vec![
            Call::Initialize("draw"),
            Call::RebuildPipeline("draw", vk::Format::B8G8R8A8_SRGB),
            Call::Initialize("other"),
            Call::RebuildPipeline("other", vk::Format::B8G8R8A8_SRGB),
        ]
    );
}

#[test]
fn test_new_without_strategies_fails() {
    let state = shared();
    let result = FrameOrchestrator::new(MockBackend::new(state, 2), Vec::new(), extent(800, 600));
    assert!(matches!(result, Err(RhiError::InvalidHandle(_))));
}

#[test]
fn test_strategy_selection() {
    let state = shared();
    let mut orch = orchestrator(
        &state,
        2,
        vec![
            MockStrategy::graphics("a", &state),
            MockStrategy::graphics("b", &state),
            MockStrategy::graphics("c", &state),
        ],
    );

    assert_eq!(orch.strategy_names(), vec!["a", "b", "c"]);
    assert_eq!(orch.active_strategy_name(), "a");

    assert!(!orch.select_strategy(3));
    assert_eq!(orch.active_strategy(), 0);

    assert!(!orch.select_strategy_by_name("missing"));
    assert!(orch.select_strategy_by_name("c"));
    assert_eq!(orch.active_strategy(), 2);

    orch.cycle_strategy();
    assert_eq!(orch.active_strategy_name(), "a");
    orch.cycle_strategy();
    assert_eq!(orch.active_strategy_name(), "b");
}

#[test]
fn test_shutdown_waits_idle_then_runs_once() {
    let state = shared();
    let mut orch = orchestrator(
        &state,
        2,
        vec![
            MockStrategy::graphics("draw", &state),
            MockStrategy::graphics("other", &state),
        ],
    );

    orch.shutdown().unwrap();
    orch.shutdown().unwrap();
    drop(orch);

    assert_eq!(
        take_log(&state),
        vec![
            Call::WaitIdle,
            Call::Shutdown("draw"),
            Call::Shutdown("other"),
        ]
    );
}

#[test]
fn test_drop_shuts_down() {
    let state = shared();
    let orch = orchestrator(&state, 2, vec![MockStrategy::graphics("draw", &state)]);
    drop(orch);

    assert_eq!(
        take_log(&state),
        vec![Call::WaitIdle, Call::Shutdown("draw")]
    );
}
