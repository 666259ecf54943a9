use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{anyhow, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{error, info, warn};

use crate::gpu::{FrameError, Simulation};
use crate::runtime::{BoxedSeedSource, FrameScheduler, FramePacer, FrameToken};
use crate::types::{GridSize, SimulationConfig};

#[derive(Debug, Default)]
struct RedrawQueue {
    next_id: u64,
    requested: Option<FrameToken>,
}

/// Frame scheduler backed by `Window::request_redraw`.
///
/// Clones share the outstanding token; the event loop takes it when the
/// matching `RedrawRequested` arrives. Cancelling drops the token, so a
/// redraw that still arrives runs no tick.
#[derive(Clone)]
pub struct RedrawScheduler {
    window: Arc<Window>,
    queue: Arc<Mutex<RedrawQueue>>,
}

impl RedrawScheduler {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            queue: Arc::default(),
        }
    }

    fn queue(&self) -> MutexGuard<'_, RedrawQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn outstanding(&self) -> Option<FrameToken> {
        self.queue().requested
    }

    pub fn take(&self) -> Option<FrameToken> {
        self.queue().requested.take()
    }
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) -> FrameToken {
        let token = {
            let mut queue = self.queue();
            queue.next_id += 1;
            let token = FrameToken::new(queue.next_id);
            queue.requested = Some(token);
            token
        };
        self.window.request_redraw();
        token
    }

    fn cancel(&mut self, token: FrameToken) {
        let mut queue = self.queue();
        if queue.requested == Some(token) {
            queue.requested = None;
        }
    }
}

#[derive(Default)]
struct MouseState {
    position: Option<PhysicalPosition<f64>>,
    is_pressed: bool,
}

impl MouseState {
    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) -> Option<(f64, f64)> {
        self.position = Some(position);
        self.brush_point()
    }

    fn handle_button(&mut self, state: ElementState) -> Option<(f64, f64)> {
        self.is_pressed = state == ElementState::Pressed;
        self.brush_point()
    }

    fn brush_point(&self) -> Option<(f64, f64)> {
        match (self.is_pressed, self.position) {
            (true, Some(pos)) => Some((pos.x, pos.y)),
            _ => None,
        }
    }
}

/// Keys the preview window reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    ToggleRun,
    Reseed,
    ToggleCumulative,
    Quit,
}

fn command_for_key(event: &KeyEvent) -> Option<Command> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Space) => Some(Command::ToggleRun),
        Key::Named(NamedKey::Escape) => Some(Command::Quit),
        Key::Character(value) if value.eq_ignore_ascii_case("r") => Some(Command::Reseed),
        Key::Character(value) if value.eq_ignore_ascii_case("c") => Some(Command::ToggleCumulative),
        Key::Character(value) if value.as_str() == " " => Some(Command::ToggleRun),
        _ => None,
    }
}

/// Window host: owns the simulation, routes input, and paces ticks.
struct WindowState {
    window: Arc<Window>,
    scheduler: RedrawScheduler,
    simulation: Simulation,
    seeds: BoxedSeedSource,
    mouse: MouseState,
    pacer: FramePacer,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &SimulationConfig, mut seeds: BoxedSeedSource) -> Result<Self> {
        let inner = window.inner_size();
        let size = GridSize::new(inner.width, inner.height)
            .or_else(|| GridSize::new(config.surface_size.0, config.surface_size.1))
            .ok_or_else(|| anyhow!("window has no drawable area"))?;
        let mut config = config.clone();
        config.surface_size = (size.width, size.height);

        let seed = seeds.generate(size)?;
        let scheduler = RedrawScheduler::new(window.clone());
        let simulation = Simulation::windowed(
            window.as_ref(),
            &config,
            &seed,
            Box::new(scheduler.clone()),
        )?;

        Ok(Self {
            window,
            scheduler,
            simulation,
            seeds,
            mouse: MouseState::default(),
            pacer: FramePacer::new(config.frame_interval),
        })
    }

    fn paint(&mut self, point: Option<(f64, f64)>) {
        if let Some((x, y)) = point {
            self.simulation.poke(x, y);
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let Some(size) = GridSize::new(new_size.width, new_size.height) else {
            return;
        };
        if size == self.simulation.size() {
            return;
        }
        match self.seeds.generate(size) {
            Ok(seed) => {
                if let Err(err) = self.simulation.resize(size.width, size.height, &seed) {
                    error!(error = %err, "failed to resize simulation");
                }
                // The restart already ran a tick.
                self.pacer.mark(Instant::now());
            }
            Err(err) => error!("failed to generate seed for {size}: {err:?}"),
        }
    }

    fn reseed(&mut self) {
        let size = self.simulation.size();
        match self.seeds.generate(size) {
            Ok(seed) => {
                if let Err(err) = self.simulation.reseed(&seed) {
                    error!(error = %err, "failed to reseed simulation");
                }
            }
            Err(err) => error!("failed to generate seed for {size}: {err:?}"),
        }
    }

    fn toggle_run(&mut self) {
        if self.simulation.is_running() {
            self.simulation.stop();
            info!("paused");
        } else if let Err(err) = self.simulation.begin() {
            warn!(error = %err, "failed to resume");
        } else {
            self.pacer.mark(Instant::now());
            info!("resumed");
        }
    }

    fn toggle_cumulative(&mut self) {
        let cumulative = !self.simulation.build_settings().cumulative;
        self.simulation.set_cumulative(cumulative);
        info!(cumulative, "cumulative display toggled");
    }

    /// Runs the pending tick if pacing allows. Returns false when the loop
    /// should exit.
    fn redraw(&mut self) -> bool {
        let now = Instant::now();
        if self.scheduler.outstanding().is_none() || !self.pacer.ready(now) {
            return true;
        }
        let Some(token) = self.scheduler.take() else {
            return true;
        };
        self.pacer.mark(now);
        match self.simulation.on_frame(token) {
            Ok(_) => true,
            Err(FrameError::OutOfMemory) => {
                error!("GPU out of memory; closing window");
                false
            }
            Err(_) => true,
        }
    }

    fn schedule(&self, elwt: &EventLoopWindowTarget<()>) {
        if self.scheduler.outstanding().is_none() {
            elwt.set_control_flow(ControlFlow::Wait);
            return;
        }
        let now = Instant::now();
        if self.pacer.ready(now) {
            self.window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        } else if let Some(deadline) = self.pacer.next_deadline() {
            tracing::trace!(
                deadline_ms = deadline.saturating_duration_since(now).as_millis(),
                "waiting for next tick"
            );
            elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
        } else {
            elwt.set_control_flow(ControlFlow::Wait);
        }
    }
}

/// Opens a window and runs the automaton until it is closed.
///
/// Left-drag paints, Space pauses and resumes, `R` reseeds, `C` toggles
/// cumulative display and Escape quits. Resizing the window reseeds the grid
/// at the new size.
pub fn run_window(config: SimulationConfig, seeds: BoxedSeedSource) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title("shadercell")
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, &config, seeds)?;
    state.simulation.begin()?;
    info!(size = %state.simulation.size(), "simulation running");

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                    WindowEvent::KeyboardInput { event, .. } => match command_for_key(&event) {
                        Some(Command::ToggleRun) => state.toggle_run(),
                        Some(Command::Reseed) => state.reseed(),
                        Some(Command::ToggleCumulative) => state.toggle_cumulative(),
                        Some(Command::Quit) => elwt.exit(),
                        None => {}
                    },
                    WindowEvent::CursorMoved { position, .. } => {
                        let point = state.mouse.handle_cursor_moved(position);
                        state.paint(point);
                    }
                    WindowEvent::MouseInput {
                        state: button_state,
                        button: MouseButton::Left,
                        ..
                    } => {
                        let point = state.mouse.handle_button(button_state);
                        state.paint(point);
                    }
                    WindowEvent::Resized(new_size) => state.resize(new_size),
                    WindowEvent::RedrawRequested => {
                        if !state.redraw() {
                            elwt.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => state.schedule(elwt),
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}
