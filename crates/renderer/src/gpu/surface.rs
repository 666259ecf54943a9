use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::types::GridSize;

use super::context::STATE_FORMAT;
use super::pipeline::ProgramLayouts;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("state surface needs positive dimensions, got {width}x{height}")]
    EmptyGrid { width: u32, height: u32 },
    #[error("seed holds {actual} bytes, a {size} RGBA8 grid needs {expected}")]
    SeedLength {
        size: GridSize,
        expected: usize,
        actual: usize,
    },
    #[error("state surface {width}x{height} exceeds the device limit of {max} texels per side")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("failed to read back state texture: {0}")]
    Readback(String),
}

/// The three state textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    /// Initial state uploaded by `initialize`; read only.
    Seed,
    /// Output of the update pass.
    Raw,
    /// Output of the color-mask pass; feeds the next tick.
    Masked,
}

pub(crate) struct StateTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
}

impl StateTexture {
    fn new(
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        sampler: &wgpu::Sampler,
        texture: wgpu::Texture,
        label: &str,
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layouts.state_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self {
            texture,
            view,
            bind_group,
        }
    }
}

fn texture_descriptor<'a>(
    label: &'a str,
    size: GridSize,
    usage: wgpu::TextureUsages,
) -> wgpu::TextureDescriptor<'a> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: size.extent(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: STATE_FORMAT,
        usage,
        view_formats: &[],
    }
}

/// GPU-resident automaton state: a read-only seed plus the two render
/// targets of the tick, and which of them feeds the next update pass.
///
/// Texel rows are stored bottom-up, so byte row 0 of a seed or readback
/// buffer is the bottom row of the displayed grid.
pub struct StateSurface {
    size: GridSize,
    seed: StateTexture,
    raw: StateTexture,
    masked: StateTexture,
    active: StateSlot,
}

impl StateSurface {
    /// Checks dimensions and seed length without touching the device.
    pub(crate) fn validate(
        width: u32,
        height: u32,
        max_dimension: u32,
        seed: &[u8],
    ) -> Result<GridSize, SurfaceError> {
        let size = GridSize::new(width, height).ok_or(SurfaceError::EmptyGrid { width, height })?;
        if width > max_dimension || height > max_dimension {
            return Err(SurfaceError::TooLarge {
                width,
                height,
                max: max_dimension,
            });
        }
        if seed.len() != size.byte_len() {
            return Err(SurfaceError::SeedLength {
                size,
                expected: size.byte_len(),
                actual: seed.len(),
            });
        }
        Ok(size)
    }

    /// Allocates the state textures and uploads `seed` into both the seed
    /// and the masked texture, so a readback before the first tick returns
    /// the seed.
    pub(crate) fn initialize(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &ProgramLayouts,
        width: u32,
        height: u32,
        max_dimension: u32,
        seed: &[u8],
    ) -> Result<Self, SurfaceError> {
        let size = Self::validate(width, height, max_dimension, seed)?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("state sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let seed_texture = device.create_texture_with_data(
            queue,
            &texture_descriptor(
                "seed state",
                size,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ),
            TextureDataOrder::LayerMajor,
            seed,
        );
        let target_usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        let raw_texture = device.create_texture(&texture_descriptor("raw state", size, target_usage));
        let masked_texture = device.create_texture_with_data(
            queue,
            &texture_descriptor("masked state", size, target_usage),
            TextureDataOrder::LayerMajor,
            seed,
        );

        tracing::debug!(%size, "state surface initialised");

        Ok(Self {
            size,
            seed: StateTexture::new(device, layouts, &sampler, seed_texture, "seed bind group"),
            raw: StateTexture::new(device, layouts, &sampler, raw_texture, "raw bind group"),
            masked: StateTexture::new(device, layouts, &sampler, masked_texture, "masked bind group"),
            active: StateSlot::Seed,
        })
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Texture the next update pass reads, and the one brush edits land in.
    pub fn active(&self) -> StateSlot {
        self.active
    }

    pub(crate) fn set_active(&mut self, slot: StateSlot) {
        self.active = slot;
    }

    pub(crate) fn slot(&self, slot: StateSlot) -> &StateTexture {
        match slot {
            StateSlot::Seed => &self.seed,
            StateSlot::Raw => &self.raw,
            StateSlot::Masked => &self.masked,
        }
    }

    /// Copies the masked texture to host memory: RGBA8, `width*4` bytes per
    /// row, row 0 at the bottom.
    pub(crate) fn readback(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<u8>, SurfaceError> {
        read_texture(device, queue, &self.masked.texture, self.size)
    }
}

/// Rounds a row length up to the copy alignment wgpu requires.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drops the per-row padding of a mapped staging buffer.
pub(crate) fn strip_row_padding(padded: &[u8], size: GridSize) -> Vec<u8> {
    let row_bytes = size.width as usize * 4;
    let stride = padded_bytes_per_row(size.width) as usize;
    let mut out = Vec::with_capacity(size.byte_len());
    for row in padded.chunks(stride).take(size.height as usize) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    out
}

pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    size: GridSize,
) -> Result<Vec<u8>, SurfaceError> {
    let bytes_per_row = padded_bytes_per_row(size.width);
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback staging"),
        size: u64::from(bytes_per_row) * u64::from(size.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(size.height),
            },
        },
        size.extent(),
    );
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| SurfaceError::Readback(err.to_string()))?;
    receiver
        .recv()
        .map_err(|err| SurfaceError::Readback(err.to_string()))?
        .map_err(|err| SurfaceError::Readback(err.to_string()))?;

    let bytes = {
        let mapped = slice.get_mapped_range();
        strip_row_padding(&mapped, size)
    };
    staging.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }

    #[test]
    fn strip_padding_keeps_row_order() {
        let size = GridSize::new(2, 3).unwrap();
        let stride = padded_bytes_per_row(2) as usize;
        let mut padded = vec![0xAA; stride * 3];
        for row in 0..3 {
            for byte in 0..8 {
                padded[row * stride + byte] = (row * 8 + byte) as u8;
            }
        }
        let stripped = strip_row_padding(&padded, size);
        assert_eq!(stripped.len(), size.byte_len());
        assert_eq!(stripped, (0..24).collect::<Vec<u8>>());
    }

    #[test]
    fn validate_rejects_bad_dimensions_and_seeds() {
        assert_eq!(
            StateSurface::validate(0, 4, 8192, &[]),
            Err(SurfaceError::EmptyGrid {
                width: 0,
                height: 4
            })
        );
        assert_eq!(
            StateSurface::validate(40_000, 2, 8192, &vec![0; 40_000 * 2 * 4]),
            Err(SurfaceError::TooLarge {
                width: 40_000,
                height: 2,
                max: 8192
            })
        );
        assert!(matches!(
            StateSurface::validate(2, 2, 8192, &[0; 15]),
            Err(SurfaceError::SeedLength {
                expected: 16,
                actual: 15,
                ..
            })
        ));
        assert_eq!(
            StateSurface::validate(2, 2, 8192, &[0; 16]),
            Ok(GridSize::new(2, 2).unwrap())
        );
    }
}
