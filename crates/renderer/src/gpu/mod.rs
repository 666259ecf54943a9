//! GPU side of the automaton.
//!
//! - `context` owns the wgpu instance/device and the display target (window
//!   surface or offscreen texture).
//! - `pipeline` holds the device-lifetime bind group layouts and quad buffer,
//!   and links compiled shader modules into render pipelines.
//! - `uniforms` mirrors the fragment prelude's std140 block.
//! - `surface` allocates the seed/raw/masked textures and reads them back.
//! - `frame` plans the four draws of a tick and records them.
//! - `brush` stamps square regions into the active texture.
//! - `state` glues everything together as `Simulation`.

mod brush;
mod context;
mod frame;
mod pipeline;
mod state;
mod surface;
mod uniforms;

pub use brush::{fill_byte, BrushEditor, BrushError, BrushRegion};
pub use frame::{plan_tick, DrawCall, DrawTarget, FramePlan, StepMode};
pub use state::{FrameError, ProgramState, Simulation};
pub use surface::{StateSlot, StateSurface, SurfaceError};

pub(crate) use pipeline::{ProgramLayouts, ShaderProgram};
