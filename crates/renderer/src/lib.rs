//! Renderer crate for shadercell, a GPU-resident cellular automaton.
//!
//! Each cell's state lives in the alpha channel of an RGBA8 texture. A tick
//! runs a user-supplied fragment rule over the whole grid and then a color
//! pass that feeds the next tick. The overall flow is:
//!
//! ```text
//!   CLI / presets
//!          │ SimulationConfig + seed bytes
//!          ▼
//!   run_window ──▶ WindowState ──▶ winit event loop ──▶ Simulation::on_frame()
//!          │                                                  │
//!          │                            SimulationClock ◀─────┤ (one pending frame)
//!          │                                                  ▼
//!          │          ShaderAssembler ──▶ ShaderProgram ──▶ FramePlan (4 draws)
//!          │                                                  │
//!          └─▶ BrushEditor ──poke──▶ StateSurface ◀───────────┘ seed / raw / masked
//! ```
//!
//! `ShaderAssembler` splices an activation function and an optional
//! cumulative-display fragment into a GLSL template and links the result with
//! `wgpu`. `StateSurface` owns the three state textures and tracks which one
//! feeds the next update pass. `plan_tick` spells out the draw order, so the
//! hand-off from seed to masked state is explicit data rather than hidden
//! mutable state. `run_headless` drives the same `Simulation` without a
//! window for snapshots and tests.

mod clock;
mod compile;
mod gpu;
mod headless;
mod runtime;
mod types;
mod window;

pub use clock::{ClockError, FireOutcome, SimulationClock};
pub use compile::{
    ActivationSource, BuildError, FragmentTemplate, ShaderAssembler, Slot, TemplateError,
    ACTIVATION_MARKER, CUMULATIVE_MARKER, CUMULATIVE_SOURCE, DEFAULT_FRAGMENT_TEMPLATE,
    DEFAULT_VERTEX_TEMPLATE,
};
pub use gpu::{
    fill_byte, plan_tick, BrushEditor, BrushError, BrushRegion, DrawCall, DrawTarget, FrameError,
    FramePlan, ProgramState, Simulation, StateSlot, StateSurface, StepMode, SurfaceError,
};
pub use headless::{run_headless, Snapshot};
pub use runtime::{
    BoxedFrameScheduler, BoxedSeedSource, FramePacer, FrameScheduler, FrameToken,
    ManualScheduler, SeedSource,
};
pub use types::{
    BrushConfig, BuildSettings, ColorMask, FrameSettings, GridSize, Kernel, ShaderConfig,
    ShaderTemplates, SimulationConfig, KERNEL_LEN,
};
pub use window::{run_window, RedrawScheduler};
