use wgpu::util::DeviceExt;

use crate::compile::BuildError;

use super::context::STATE_FORMAT;

/// Two triangles covering clip space; the vertex template reads them as
/// `coordinates`.
pub(crate) const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

/// Device-lifetime objects shared by every program build: bind group
/// layouts for the uniform block and the input texture, and the quad buffer.
pub(crate) struct ProgramLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub state_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub quad: wgpu::Buffer,
}

impl ProgramLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let state_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("state texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("automaton pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &state_layout],
            push_constant_ranges: &[],
        });

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            uniform_layout,
            state_layout,
            pipeline_layout,
            quad,
        }
    }
}

/// A linked program. The same shader pair is linked twice: once for the
/// RGBA8 state textures and once for the display format.
pub(crate) struct ShaderProgram {
    pub offscreen: wgpu::RenderPipeline,
    pub display: wgpu::RenderPipeline,
}

impl ShaderProgram {
    pub fn link(
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
        display_format: wgpu::TextureFormat,
    ) -> Result<Self, BuildError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let offscreen = create_pipeline(device, layouts, vertex, fragment, STATE_FORMAT, "offscreen");
        let display = create_pipeline(device, layouts, vertex, fragment, display_format, "display");
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(BuildError::Link(error.to_string()));
        }
        Ok(Self { offscreen, display })
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layouts: &ProgramLayouts,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layouts.pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
