use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use splitcube_coordinator::{AppConfig, Coordinator, DisplaySource};
use splitcube_physics::{PhysicsRequest, PhysicsResponse};
use splitcube_protocol::{TracingSink, WorkerHandle};
use splitcube_render::{RenderRequest, RenderResponse};
use splitcube_render_wgpu::WindowSurface;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(
    name = "splitcube-desktop",
    about = "Rotating cube, simulated and rendered on worker threads"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hand the window to the pipeline as a shared handle instead of moving it
    #[arg(long)]
    shared_surface: bool,
}

type DesktopCoordinator = Coordinator<
    WindowSurface,
    WorkerHandle<PhysicsRequest, PhysicsResponse>,
    WorkerHandle<RenderRequest<WindowSurface>, RenderResponse>,
    TracingSink,
>;

struct App {
    config: AppConfig,
    shared_surface: bool,
    window: Option<Arc<Window>>,
    coordinator: Option<DesktopCoordinator>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig, shared_surface: bool) -> Self {
        Self {
            config,
            shared_surface,
            window: None,
            coordinator: None,
            error: None,
        }
    }

    fn display_source(&self, window: &Arc<Window>) -> DisplaySource<WindowSurface> {
        let surface = WindowSurface::new(Arc::clone(window));
        if self.shared_surface {
            DisplaySource::SharedOnly(Arc::new(Mutex::new(surface)))
        } else {
            DisplaySource::Transferable(surface)
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let size = PhysicalSize::new(self.config.window.width, self.config.window.height);
        let attrs = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(size);
        let window = Arc::new(event_loop.create_window(attrs)?);

        let physics = splitcube_physics::spawn(self.config.simulation)?;
        let render = splitcube_render::spawn::<WindowSurface>(self.config.pipeline)?;
        let mut coordinator =
            Coordinator::new(physics, render, TracingSink, self.config.coordinator);
        coordinator.start(self.display_source(&window), Instant::now())?;

        window.request_redraw();
        self.window = Some(window);
        self.coordinator = Some(coordinator);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{error:#}");
        self.error = Some(error);
        self.stop(event_loop);
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut coordinator) = self.coordinator.take() {
            match coordinator.shutdown() {
                Ok(stats) => tracing::info!(
                    ticks = stats.ticks,
                    rendered = stats.frames_rendered,
                    skipped = stats.frames_skipped,
                    "session finished"
                ),
                Err(e) => tracing::warn!("shutdown: {e}"),
            }
        }
        event_loop.exit();
    }

    fn frame(&mut self) -> Result<()> {
        let Some(coordinator) = &mut self.coordinator else {
            return Ok(());
        };
        coordinator.tick(Instant::now())?;
        coordinator.pump()?;
        Ok(())
    }

    /// Rebuild the pipeline on a fresh surface. A surface can only be bound
    /// once, so recovery always starts from the window.
    fn reinitialize(&mut self) -> Result<()> {
        let Some(window) = self.window.clone() else {
            return Ok(());
        };
        let source = self.display_source(&window);
        if let Some(coordinator) = &mut self.coordinator {
            coordinator.reinitialize_renderer(source)?;
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.stop(event_loop),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyR),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Err(e) = self.reinitialize() {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    tracing::info!("splitcube-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, cli.shared_surface);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
