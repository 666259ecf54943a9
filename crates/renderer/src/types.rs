use std::time::Duration;

use crate::compile::{ActivationSource, DEFAULT_FRAGMENT_TEMPLATE, DEFAULT_VERTEX_TEMPLATE};

/// Number of weights in the 3x3 convolution kernel.
pub const KERNEL_LEN: usize = 9;

/// Convolution weights fed to the update pass, row-major from the bottom-left
/// neighbour to the top-right one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel(pub [f32; KERNEL_LEN]);

impl Kernel {
    /// Kernel that copies the centre cell and ignores its neighbours.
    pub const IDENTITY: Kernel = Kernel([0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);

    /// Builds a kernel from an arbitrary slice, rejecting the wrong length.
    pub fn from_slice(weights: &[f32]) -> Option<Self> {
        let weights: [f32; KERNEL_LEN] = weights.try_into().ok()?;
        Some(Self(weights))
    }

    pub fn weights(&self) -> &[f32; KERNEL_LEN] {
        &self.0
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Per-channel multipliers applied by the color-mask pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMask {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl ColorMask {
    pub const WHITE: ColorMask = ColorMask {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Layout used by the uniform block; alpha is always one.
    pub(crate) fn as_vec4(&self) -> [f32; 4] {
        [self.r, self.g, self.b, 1.0]
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<[f32; 3]> for ColorMask {
    fn from(rgb: [f32; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2])
    }
}

/// Settings baked into the fragment shader text. Changing any of them
/// invalidates the linked program.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSettings {
    pub activation: ActivationSource,
    pub cumulative: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            activation: ActivationSource::identity(),
            cumulative: false,
        }
    }
}

/// Settings delivered through the uniform block on every draw.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameSettings {
    pub kernel: Kernel,
    pub color_mask: ColorMask,
}

/// Complete shader configuration, split by how a change is applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderConfig {
    pub build: BuildSettings,
    pub frame: FrameSettings,
}

/// Vertex and fragment template text handed to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderTemplates {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderTemplates {
    fn default() -> Self {
        Self {
            vertex: DEFAULT_VERTEX_TEMPLATE.to_string(),
            fragment: DEFAULT_FRAGMENT_TEMPLATE.to_string(),
        }
    }
}

/// Brush parameters in user terms; see `BrushEditor` for the expanded form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushConfig {
    pub size: u32,
    pub value: f32,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            size: 5,
            value: 1.0,
        }
    }
}

/// Grid dimensions in texels. Both sides are at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self { width, height })
        }
    }

    /// Number of bytes an RGBA8 buffer covering the whole grid occupies.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub(crate) fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl std::fmt::Display for GridSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Immutable configuration passed to the window host at start-up.
///
/// `SimulationConfig` mirrors CLI flags and preset files: which shader rule to
/// assemble, how large the initial window is, and how fast ticks may run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Initial window size in physical pixels; the grid follows the window.
    pub surface_size: (u32, u32),
    /// Vertex/fragment templates.
    pub templates: ShaderTemplates,
    /// Activation, cumulative flag, kernel, and color mask.
    pub shader: ShaderConfig,
    /// Brush used for painting with the pointer.
    pub brush: BrushConfig,
    /// Minimum time between ticks; `None` ticks once per redraw.
    pub frame_interval: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            templates: ShaderTemplates::default(),
            shader: ShaderConfig::default(),
            brush: BrushConfig::default(),
            frame_interval: None,
        }
    }
}
