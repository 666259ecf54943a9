use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::clock::{ClockError, FireOutcome, SimulationClock};
use crate::compile::{ActivationSource, BuildError, ShaderAssembler, TemplateError};
use crate::runtime::{BoxedFrameScheduler, FrameToken};
use crate::types::{
    BrushConfig, BuildSettings, ColorMask, FrameSettings, GridSize, Kernel, ShaderTemplates,
    SimulationConfig,
};

use super::brush::{BrushEditor, BrushError};
use super::context::GpuContext;
use super::frame::{plan_tick, FrameEncoder};
use super::pipeline::{ProgramLayouts, ShaderProgram};
use super::surface::{StateSlot, StateSurface, SurfaceError};
use super::uniforms::AutomatonUniforms;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("display surface was lost")]
    SurfaceLost,
    #[error("display surface is outdated")]
    SurfaceOutdated,
    #[error("GPU ran out of memory")]
    OutOfMemory,
    #[error("timed out waiting for a display frame")]
    Timeout,
    #[error("display surface error: {0}")]
    Other(String),
}

impl From<wgpu::SurfaceError> for FrameError {
    fn from(value: wgpu::SurfaceError) -> Self {
        match value {
            wgpu::SurfaceError::Lost => FrameError::SurfaceLost,
            wgpu::SurfaceError::Outdated => FrameError::SurfaceOutdated,
            wgpu::SurfaceError::OutOfMemory => FrameError::OutOfMemory,
            wgpu::SurfaceError::Timeout => FrameError::Timeout,
            other => FrameError::Other(other.to_string()),
        }
    }
}

/// Whether the linked program reflects the current build settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Current,
    /// A build setting changed; the next tick rebuilds.
    Stale,
    /// The last rebuild failed; the previous program stays in use until a
    /// build setting changes or `recompile` is called.
    Failed,
}

/// One automaton running on one GPU context.
///
/// Owns the assembler, the state textures, the brush and the tick clock.
/// Every mutation goes through `&mut self`, so brush edits and resizes are
/// serialised with ticks by construction.
pub struct Simulation {
    context: GpuContext,
    layouts: ProgramLayouts,
    assembler: ShaderAssembler,
    program: ShaderProgram,
    program_state: ProgramState,
    frame: FrameSettings,
    uniforms: AutomatonUniforms,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    surface: StateSurface,
    brush: BrushEditor,
    clock: SimulationClock,
    ticks: u64,
}

impl Simulation {
    /// Simulation presenting into a window. `seed` covers
    /// `config.surface_size`.
    pub fn windowed<T>(
        target: &T,
        config: &SimulationConfig,
        seed: &[u8],
        scheduler: BoxedFrameScheduler,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let size = grid_from(config.surface_size)?;
        let context = GpuContext::new_windowed(target, size)?;
        Self::new(context, config, seed, scheduler)
    }

    /// Simulation without a window; display draws go to an offscreen
    /// texture.
    pub fn headless(
        config: &SimulationConfig,
        seed: &[u8],
        scheduler: BoxedFrameScheduler,
    ) -> Result<Self> {
        let size = grid_from(config.surface_size)?;
        let context = GpuContext::new_headless(size)?;
        Self::new(context, config, seed, scheduler)
    }

    fn new(
        context: GpuContext,
        config: &SimulationConfig,
        seed: &[u8],
        scheduler: BoxedFrameScheduler,
    ) -> Result<Self> {
        let layouts = ProgramLayouts::new(&context.device);
        let assembler = ShaderAssembler::new(&config.templates, config.shader.build.clone())
            .context("invalid shader templates")?;
        let program = assembler
            .build(&context.device, &layouts, context.display_format)
            .context("failed to build the initial shader program")?;

        let frame = config.shader.frame;
        let uniforms = AutomatonUniforms::new(context.size, &frame);
        let uniform_buffer =
            context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("automaton uniforms"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        let surface = StateSurface::initialize(
            &context.device,
            &context.queue,
            &layouts,
            context.size.width,
            context.size.height,
            context.max_dimension,
            seed,
        )?;
        let brush = BrushEditor::with_max_size(config.brush, context.max_dimension)?;

        Ok(Self {
            context,
            layouts,
            assembler,
            program,
            program_state: ProgramState::Current,
            frame,
            uniforms,
            uniform_buffer,
            uniform_bind_group,
            surface,
            brush,
            clock: SimulationClock::new(scheduler),
            ticks: 0,
        })
    }

    /// Starts the loop and runs the first tick right away; later ticks run
    /// from scheduler callbacks. A failed first tick is logged and the loop
    /// keeps running.
    pub fn begin(&mut self) -> Result<(), ClockError> {
        self.clock.begin()?;
        if let Err(err) = self.tick() {
            warn!(error = %err, "first tick failed");
        }
        self.clock.finish_tick();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.clock.stop();
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Token the clock is currently waiting on, if any.
    pub fn pending_frame(&self) -> Option<FrameToken> {
        self.clock.pending()
    }

    /// Delivers a frame callback. Runs a tick when `token` is the pending
    /// one and schedules the next frame while running. Returns whether a
    /// tick ran; a failed tick is still rescheduled.
    pub fn on_frame(&mut self, token: FrameToken) -> Result<bool, FrameError> {
        if self.clock.fire(token) == FireOutcome::Ignored {
            return Ok(false);
        }
        let result = self.tick();
        self.clock.finish_tick();
        result.map(|()| true)
    }

    /// Runs one update + color-mask iteration regardless of the clock.
    pub fn tick(&mut self) -> Result<(), FrameError> {
        if self.program_state == ProgramState::Stale {
            self.rebuild();
        }

        let display = match self.context.acquire() {
            Ok(display) => display,
            Err(err) => {
                warn!(error = %err, "skipping tick");
                if matches!(err, FrameError::SurfaceLost | FrameError::SurfaceOutdated) {
                    self.context.reconfigure();
                }
                return Err(err);
            }
        };

        let plan = plan_tick(self.surface.active());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("tick encoder"),
                });
        FrameEncoder {
            device: &self.context.device,
            layouts: &self.layouts,
            program: &self.program,
            surface: &self.surface,
            uniform_buffer: &self.uniform_buffer,
            uniform_bind_group: &self.uniform_bind_group,
            uniforms: self.uniforms,
        }
        .encode(&mut encoder, &plan, &display.view);
        self.context.queue.submit(Some(encoder.finish()));
        display.present();

        self.surface.set_active(plan.next_active);
        self.ticks += 1;
        Ok(())
    }

    fn rebuild(&mut self) {
        match self.assembler.build(
            &self.context.device,
            &self.layouts,
            self.context.display_format,
        ) {
            Ok(program) => {
                self.program = program;
                self.program_state = ProgramState::Current;
            }
            Err(_) => {
                warn!("keeping the previous shader program");
                self.program_state = ProgramState::Failed;
            }
        }
    }

    /// Rebuilds the program from the saved templates right away.
    pub fn recompile(&mut self) -> Result<(), BuildError> {
        match self.assembler.build(
            &self.context.device,
            &self.layouts,
            self.context.display_format,
        ) {
            Ok(program) => {
                self.program = program;
                self.program_state = ProgramState::Current;
                Ok(())
            }
            Err(err) => {
                self.program_state = ProgramState::Failed;
                Err(err)
            }
        }
    }

    /// Stops, reallocates state and display at the new size, and starts
    /// again. Nothing changes if `seed` does not fit the new size.
    pub fn resize(&mut self, width: u32, height: u32, seed: &[u8]) -> Result<(), SurfaceError> {
        let surface = StateSurface::initialize(
            &self.context.device,
            &self.context.queue,
            &self.layouts,
            width,
            height,
            self.context.max_dimension,
            seed,
        )?;
        self.stop();
        let size = surface.size();
        self.surface = surface;
        self.context.resize(size);
        self.uniforms.set_grid(size);
        debug!(%size, "simulation resized");
        if let Err(err) = self.begin() {
            warn!(error = %err, "failed to restart after resize");
        }
        Ok(())
    }

    /// Replaces the state with `seed` at the current size. The run state is
    /// left alone.
    pub fn reseed(&mut self, seed: &[u8]) -> Result<(), SurfaceError> {
        let size = self.surface.size();
        self.surface = StateSurface::initialize(
            &self.context.device,
            &self.context.queue,
            &self.layouts,
            size.width,
            size.height,
            self.context.max_dimension,
            seed,
        )?;
        Ok(())
    }

    /// Stamps the brush at window pixel `(x, y)` (origin top-left).
    pub fn poke(&mut self, x: f64, y: f64) {
        self.brush.poke(&self.context.queue, &self.surface, x, y);
    }

    pub fn set_brush(&mut self, size: u32, value: f32) -> Result<(), BrushError> {
        self.brush.set_brush(size, value)
    }

    pub fn set_activation(&mut self, activation: ActivationSource) {
        self.assembler.set_activation(activation);
        self.program_state = ProgramState::Stale;
    }

    pub fn set_cumulative(&mut self, cumulative: bool) {
        self.assembler.set_cumulative(cumulative);
        self.program_state = ProgramState::Stale;
    }

    pub fn set_templates(
        &mut self,
        vertex: &str,
        fragment: &str,
        activation: Option<ActivationSource>,
    ) -> Result<(), TemplateError> {
        self.assembler.set_templates(vertex, fragment, activation)?;
        self.program_state = ProgramState::Stale;
        Ok(())
    }

    /// Takes effect from the next tick without a rebuild.
    pub fn set_kernel(&mut self, kernel: Kernel) {
        self.frame.kernel = kernel;
        self.uniforms.set_frame(&self.frame);
    }

    /// Takes effect from the next tick without a rebuild.
    pub fn set_color_mask(&mut self, color_mask: ColorMask) {
        self.frame.color_mask = color_mask;
        self.uniforms.set_frame(&self.frame);
    }

    /// Masked state as RGBA8 rows, bottom row first.
    pub fn readback(&self) -> Result<Vec<u8>, SurfaceError> {
        self.surface
            .readback(&self.context.device, &self.context.queue)
    }

    pub fn size(&self) -> GridSize {
        self.surface.size()
    }

    pub fn active_slot(&self) -> StateSlot {
        self.surface.active()
    }

    pub fn program_state(&self) -> ProgramState {
        self.program_state
    }

    pub fn build_settings(&self) -> &BuildSettings {
        self.assembler.settings()
    }

    pub fn frame_settings(&self) -> FrameSettings {
        self.frame
    }

    pub fn templates(&self) -> ShaderTemplates {
        self.assembler.templates()
    }

    pub fn brush(&self) -> BrushConfig {
        self.brush.config()
    }

    /// Ticks run since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

fn grid_from((width, height): (u32, u32)) -> Result<GridSize> {
    GridSize::new(width, height)
        .with_context(|| format!("grid size must be positive, got {width}x{height}"))
}
