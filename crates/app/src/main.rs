//! frameloop - Main Entry Point
//!
//! Opens a window and drives the frame orchestrator from the winit event
//! loop. Tab cycles through the render strategies, 1..9 select one directly.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use frameloop_core::{Config, DEFAULT_CONFIG_PATH, PresentModePreference};
use frameloop_platform::{InputAction, Window, action_for_key};
use frameloop_renderer::{FrameStatus, Renderer};

#[derive(Debug, Parser)]
#[command(name = "frameloop", version, about = "Vulkan frame orchestration demo")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Initial render strategy (gradient, particles)
    #[arg(long)]
    strategy: Option<String>,

    /// Number of frames that may be in flight at once
    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// Preferred present mode (mailbox, fifo, immediate)
    #[arg(long)]
    present_mode: Option<PresentModePreference>,

    /// Disable the Vulkan validation layer
    #[arg(long)]
    no_validation: bool,
}

impl Args {
    /// Applies command line overrides on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(strategy) = &self.strategy {
            config.render.strategy = strategy.clone();
        }
        if let Some(frames) = self.frames_in_flight {
            config.render.frames_in_flight = frames;
        }
        if let Some(mode) = self.present_mode {
            config.render.present_mode = mode;
        }
        if self.no_validation {
            config.render.validation = false;
        }
    }
}

struct App {
    config: Config,
    window: Option<Window>,
    renderer: Option<Renderer>,
    /// First fatal error; stops the loop and is returned from `main`.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let renderer = Renderer::new(&window, &self.config.render).context("creating renderer")?;

        info!(
            "Initialization complete, strategies: {:?}",
            renderer.strategy_names()
        );

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.render_frame() {
            Ok(FrameStatus::Suspended) => {
                // Nothing to draw until the window is restored.
                event_loop.set_control_flow(ControlFlow::Wait);
            }
            Ok(_) => event_loop.set_control_flow(ControlFlow::Poll),
            Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("rendering frame")),
        }
    }

    fn handle_action(&mut self, event_loop: &ActiveEventLoop, action: InputAction) {
        match action {
            InputAction::Quit => {
                info!("Escape pressed, shutting down");
                event_loop.exit();
            }
            InputAction::CycleStrategy => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.cycle_strategy();
                }
            }
            InputAction::SelectStrategy(index) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.select_strategy(index);
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                if size.width > 0 && size.height > 0 {
                    event_loop.set_control_flow(ControlFlow::Poll);
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && !event.repeat
                    && let PhysicalKey::Code(key) = event.physical_key
                    && let Some(action) = action_for_key(key)
                {
                    self.handle_action(event_loop, action);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window
            && !window.is_minimized()
        {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut renderer) = self.renderer.take() {
            info!("Exiting after {} frames", renderer.tick_count());
            if let Err(e) = renderer.shutdown() {
                warn!("Shutdown failed: {}", e);
            }
        }
        self.window = None;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    frameloop_core::init_logging(config.log.filter.as_deref());
    info!("Starting frameloop");
    debug!("Config: {:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "frameloop",
            "--strategy",
            "particles",
            "--frames-in-flight",
            "3",
            "--present-mode",
            "fifo",
            "--no-validation",
        ]);

        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.render.strategy, "particles");
        assert_eq!(config.render.frames_in_flight, 3);
        assert_eq!(config.render.present_mode, PresentModePreference::Fifo);
        assert!(!config.render.validation);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let args = Args::parse_from(["frameloop"]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.render.strategy, Config::default().render.strategy);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }
}
