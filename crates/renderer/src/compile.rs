use std::borrow::Cow;

use wgpu::naga::front::glsl;
use wgpu::naga::ShaderStage;

use crate::gpu::{ProgramLayouts, ShaderProgram};
use crate::types::{BuildSettings, ShaderTemplates};

/// Marker replaced by the activation function source.
pub const ACTIVATION_MARKER: &str = "ACTIVATION_FUNCTION";
/// Marker replaced by the cumulative-display fragment (or nothing).
pub const CUMULATIVE_MARKER: &str = "CUMULATIVE_DISPLAY";

/// Fixed fragment injected when cumulative display is enabled. It expects a
/// `float x` in scope at the injection point.
pub const CUMULATIVE_SOURCE: &str =
    "x += texture2D(u_image, getCoords(texCoord, vec2(0.0, 0.0))).a;";

/// Names the prelude defines; template lines re-declaring them are dropped.
const PRELUDE_NAMES: [&str; 6] = [
    "onePixel",
    "doStep",
    "colorMask",
    "u_kernel",
    "u_image",
    "texCoord",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("fragment template is missing the {0} marker")]
    MissingMarker(&'static str),
    #[error("fragment template contains the {0} marker more than once")]
    DuplicateMarker(&'static str),
    #[error("activation source is empty")]
    EmptyActivation,
    #[error("activation source does not declare an `activation(...)` function")]
    MissingActivationFunction,
    #[error("activation source must not contain the {0} marker")]
    NestedMarker(&'static str),
    #[error("activation source has unbalanced '{open}'/'{close}'")]
    Unbalanced { open: char, close: char },
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: &'static str, log: String },
    #[error("shader program failed to link:\n{0}")]
    Link(String),
}

/// Injection points of the fragment template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Activation,
    Cumulative,
}

impl Slot {
    const ALL: [Slot; 2] = [Slot::Activation, Slot::Cumulative];

    pub fn marker(self) -> &'static str {
        match self {
            Slot::Activation => ACTIVATION_MARKER,
            Slot::Cumulative => CUMULATIVE_MARKER,
        }
    }
}

/// Activation function source that has passed composition-time checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationSource(String);

impl ActivationSource {
    pub fn new(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(TemplateError::EmptyActivation);
        }
        for slot in Slot::ALL {
            if source.contains(slot.marker()) {
                return Err(TemplateError::NestedMarker(slot.marker()));
            }
        }
        if !declares_activation(&source) {
            return Err(TemplateError::MissingActivationFunction);
        }
        check_balanced(&source, '{', '}')?;
        check_balanced(&source, '(', ')')?;
        Ok(Self(source))
    }

    /// `float activation(float x) { return x; }`
    pub fn identity() -> Self {
        Self(IDENTITY_ACTIVATION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActivationSource {
    fn default() -> Self {
        Self::identity()
    }
}

fn declares_activation(source: &str) -> bool {
    source.match_indices("activation").any(|(index, name)| {
        let before_ok = source[..index]
            .chars()
            .next_back()
            .map_or(true, |ch| !(ch.is_alphanumeric() || ch == '_'));
        let after = source[index + name.len()..].trim_start();
        before_ok && after.starts_with('(')
    })
}

fn check_balanced(source: &str, open: char, close: char) -> Result<(), TemplateError> {
    let mut depth: i64 = 0;
    for ch in source.chars() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth < 0 {
                break;
            }
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(TemplateError::Unbalanced { open, close })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

/// Fragment template split into literal text and typed injection slots.
///
/// Parsing strips `#version`/`precision` directives and any declaration of a
/// name the prelude already provides, then requires each marker exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentTemplate {
    segments: Vec<Segment>,
}

impl FragmentTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let sanitized = sanitize_template(source);

        let mut found = Vec::with_capacity(Slot::ALL.len());
        for slot in Slot::ALL {
            let mut hits = sanitized.match_indices(slot.marker()).map(|(index, _)| index);
            let first = hits.next().ok_or(TemplateError::MissingMarker(slot.marker()))?;
            if hits.next().is_some() {
                return Err(TemplateError::DuplicateMarker(slot.marker()));
            }
            found.push((first, slot));
        }
        found.sort_by_key(|(index, _)| *index);

        let mut segments = Vec::with_capacity(found.len() * 2 + 1);
        let mut cursor = 0;
        for (index, slot) in found {
            if index > cursor {
                segments.push(Segment::Text(sanitized[cursor..index].to_string()));
            }
            segments.push(Segment::Slot(slot));
            cursor = index + slot.marker().len();
        }
        if cursor < sanitized.len() {
            segments.push(Segment::Text(sanitized[cursor..].to_string()));
        }

        Ok(Self { segments })
    }

    /// Renders the template body (without the prelude) with the given slot fills.
    pub fn render(&self, settings: &BuildSettings) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(Slot::Activation) => out.push_str(settings.activation.as_str()),
                Segment::Slot(Slot::Cumulative) => {
                    if settings.cumulative {
                        out.push_str(CUMULATIVE_SOURCE);
                    }
                }
            }
        }
        out
    }
}

fn sanitize_template(source: &str) -> String {
    let mut sanitized = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
            continue;
        }
        let is_declaration = ["uniform ", "varying ", "in ", "out "]
            .iter()
            .any(|keyword| trimmed.starts_with(keyword));
        if is_declaration && redeclares_prelude_name(trimmed) {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }
    sanitized
}

/// Whole-identifier match, so `u_imageScale` is not mistaken for `u_image`.
fn redeclares_prelude_name(line: &str) -> bool {
    line.split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .any(|ident| ident == "gl_FragColor" || PRELUDE_NAMES.contains(&ident))
}

/// Builds shader programs from the saved templates and the current build
/// settings. Templates are kept unmodified so `recompile` can re-apply
/// whatever activation/cumulative state is current.
pub struct ShaderAssembler {
    vertex_source: String,
    fragment_source: String,
    fragment: FragmentTemplate,
    settings: BuildSettings,
}

impl ShaderAssembler {
    pub fn new(templates: &ShaderTemplates, settings: BuildSettings) -> Result<Self, TemplateError> {
        let fragment = FragmentTemplate::parse(&templates.fragment)?;
        Ok(Self {
            vertex_source: templates.vertex.clone(),
            fragment_source: templates.fragment.clone(),
            fragment,
            settings,
        })
    }

    /// Replaces the saved templates and, when given, the activation source.
    /// Nothing changes if any input is rejected.
    pub fn set_templates(
        &mut self,
        vertex: &str,
        fragment: &str,
        activation: Option<ActivationSource>,
    ) -> Result<(), TemplateError> {
        let parsed = FragmentTemplate::parse(fragment)?;
        self.vertex_source = vertex.to_string();
        self.fragment_source = fragment.to_string();
        self.fragment = parsed;
        if let Some(activation) = activation {
            self.settings.activation = activation;
        }
        Ok(())
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn set_activation(&mut self, activation: ActivationSource) {
        self.settings.activation = activation;
    }

    pub fn set_cumulative(&mut self, cumulative: bool) {
        self.settings.cumulative = cumulative;
    }

    pub fn templates(&self) -> ShaderTemplates {
        ShaderTemplates {
            vertex: self.vertex_source.clone(),
            fragment: self.fragment_source.clone(),
        }
    }

    /// Full fragment source: prelude followed by the rendered template.
    pub fn compose_fragment(&self) -> String {
        let body = self.fragment.render(&self.settings);
        format!("{PRELUDE}\n#line 1\n{body}")
    }

    /// Compiles both stages and links them into a program targeting the state
    /// textures and the display format. Diagnostics are logged as well as
    /// returned; the caller keeps its previous program on error.
    pub(crate) fn build(
        &self,
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        display_format: wgpu::TextureFormat,
    ) -> Result<ShaderProgram, BuildError> {
        let result = self.build_inner(device, layouts, display_format);
        match &result {
            Ok(_) => tracing::debug!(
                cumulative = self.settings.cumulative,
                "shader program built"
            ),
            Err(err) => tracing::warn!("{err}"),
        }
        result
    }

    fn build_inner(
        &self,
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        display_format: wgpu::TextureFormat,
    ) -> Result<ShaderProgram, BuildError> {
        let vertex = compile_stage(device, &self.vertex_source, ShaderStage::Vertex)?;
        let fragment = compile_stage(device, &self.compose_fragment(), ShaderStage::Fragment)?;
        ShaderProgram::link(device, layouts, &vertex, &fragment, display_format)
    }
}

fn stage_name(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vertex",
        ShaderStage::Fragment => "fragment",
        _ => "compute",
    }
}

/// Parses the GLSL up front so compile errors come back as text, then creates
/// the module inside a validation scope.
fn compile_stage(
    device: &wgpu::Device,
    source: &str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, BuildError> {
    let name = stage_name(stage);
    let mut frontend = glsl::Frontend::default();
    if let Err(errors) = frontend.parse(&glsl::Options::from(stage), source) {
        return Err(BuildError::Compile {
            stage: name,
            log: errors.to_string(),
        });
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(match stage {
            ShaderStage::Vertex => "automaton vertex",
            _ => "automaton fragment",
        }),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_string()),
            stage,
            defines: &[],
        },
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(BuildError::Compile {
            stage: name,
            log: error.to_string(),
        });
    }
    Ok(module)
}

const IDENTITY_ACTIVATION: &str = "float activation(float x) {
    return x;
}";

/// GLSL prologue injected ahead of every fragment template.
///
/// The uniform block layout must match `AutomatonUniforms` in
/// `gpu/uniforms.rs`. WebGL-style names used by templates are mapped onto the
/// block, the split texture/sampler pair, and the in/out varyings.
const PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 shadercell_texCoord;
layout(location = 0) out vec4 shadercell_fragColor;

layout(std140, set = 0, binding = 0) uniform AutomatonParams {
    vec2 _onePixel;
    float _doStep;
    float _present;
    vec4 _colorMask;
    float _kernel[9];
} params;

layout(set = 1, binding = 0) uniform texture2D shadercell_state_texture;
layout(set = 1, binding = 1) uniform sampler shadercell_state_sampler;

#define onePixel params._onePixel
#define doStep (params._doStep > 0.5)
#define colorMask params._colorMask
#define u_kernel params._kernel
#define u_image sampler2D(shadercell_state_texture, shadercell_state_sampler)
#define texture2D texture
#define gl_FragColor shadercell_fragColor

// State rows are stored bottom-up. Offscreen draws mirror the coordinate so
// output row N samples input row N; display draws do not.
vec2 shadercell_tex_coord() {
    float v = params._present > 0.5 ? shadercell_texCoord.y : 1.0 - shadercell_texCoord.y;
    return vec2(shadercell_texCoord.x, v);
}
#define texCoord shadercell_tex_coord()

vec2 getCoords(vec2 coord, vec2 offset) {
    return mod(coord + onePixel * offset, vec2(1.0));
}
";

/// Full-screen quad vertex shader; used verbatim.
pub const DEFAULT_VERTEX_TEMPLATE: &str = r"#version 450
layout(location = 0) in vec2 coordinates;
layout(location = 0) out vec2 texCoord;

void main() {
    texCoord = coordinates * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(coordinates, 0.0, 1.0);
}
";

/// Neural-automaton rule: 3x3 convolution of alpha, then activation. The
/// color-mask branch writes `colorMask * x` with `x` kept in alpha.
pub const DEFAULT_FRAGMENT_TEMPLATE: &str = r"ACTIVATION_FUNCTION

void main() {
    if (doStep) {
        float x = 0.0;
        for (int j = 0; j < 3; j++) {
            for (int i = 0; i < 3; i++) {
                vec2 offset = vec2(float(i - 1), float(j - 1));
                x += u_kernel[j * 3 + i] * texture2D(u_image, getCoords(texCoord, offset)).a;
            }
        }
        x = activation(x);
        gl_FragColor = vec4(x, x, x, x);
    } else {
        float x = texture2D(u_image, texCoord).a;
        CUMULATIVE_DISPLAY
        gl_FragColor = vec4(colorMask.rgb * x, x);
    }
}
";
