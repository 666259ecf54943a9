use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use super::state::FrameError;
use crate::types::GridSize;

/// Format of the three state textures and of the headless display target.
pub(crate) const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Where the display draws of a tick end up.
pub(crate) enum DisplayTarget {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

/// A display texture acquired for one tick.
pub(crate) struct DisplayFrame {
    surface_texture: Option<wgpu::SurfaceTexture>,
    pub view: wgpu::TextureView,
}

impl DisplayFrame {
    pub fn present(self) {
        if let Some(texture) = self.surface_texture {
            texture.present();
        }
    }
}

pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub display: DisplayTarget,
    pub display_format: wgpu::TextureFormat,
    pub size: GridSize,
    /// Largest texture edge the device accepts.
    pub max_dimension: u32,
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
    size: GridSize,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")?;

    let info = adapter.get_info();
    let limits = adapter.limits();
    tracing::debug!(
        name = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "selected GPU adapter"
    );

    let max_dimension = limits.max_texture_dimension_2d;
    if size.width > max_dimension || size.height > max_dimension {
        anyhow::bail!("GPU max texture dimension is {max_dimension}, requested grid is {size}");
    }

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("shadercell device"),
        required_features: wgpu::Features::empty(),
        required_limits: limits,
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")?;

    Ok((adapter, device, queue))
}

fn create_offscreen_display(device: &wgpu::Device, size: GridSize) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen display"),
        size: size.extent(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: STATE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

impl GpuContext {
    /// Context presenting to a window surface.
    pub(crate) fn new_windowed<T>(target: &T, size: GridSize) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // The caller keeps the window alive for as long as the context exists.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let (adapter, device, queue) = request_device(&instance, Some(&surface), size)?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        if format.is_srgb() {
            tracing::warn!(?format, "no linear surface format available; colors will be gamma encoded");
        }
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        tracing::debug!(?format, ?present_mode, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let max_dimension = device.limits().max_texture_dimension_2d;
        Ok(Self {
            _instance: instance,
            device,
            queue,
            display: DisplayTarget::Window { surface, config },
            display_format: format,
            size,
            max_dimension,
        })
    }

    /// Context without a window; display draws land in an offscreen texture.
    pub(crate) fn new_headless(size: GridSize) -> Result<Self> {
        let instance = create_instance();
        let (_adapter, device, queue) = request_device(&instance, None, size)?;
        let texture = create_offscreen_display(&device, size);
        let max_dimension = device.limits().max_texture_dimension_2d;
        Ok(Self {
            _instance: instance,
            device,
            queue,
            display: DisplayTarget::Offscreen { texture },
            display_format: STATE_FORMAT,
            size,
            max_dimension,
        })
    }

    pub(crate) fn resize(&mut self, size: GridSize) {
        self.size = size;
        match &mut self.display {
            DisplayTarget::Window { surface, config } => {
                config.width = size.width;
                config.height = size.height;
                surface.configure(&self.device, config);
            }
            DisplayTarget::Offscreen { texture } => {
                *texture = create_offscreen_display(&self.device, size);
            }
        }
    }

    pub(crate) fn acquire(&self) -> Result<DisplayFrame, FrameError> {
        match &self.display {
            DisplayTarget::Window { surface, .. } => {
                let surface_texture = surface.get_current_texture().map_err(FrameError::from)?;
                let view = surface_texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(DisplayFrame {
                    surface_texture: Some(surface_texture),
                    view,
                })
            }
            DisplayTarget::Offscreen { texture } => Ok(DisplayFrame {
                surface_texture: None,
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            }),
        }
    }

    /// Reconfigures the window surface after it was lost or outdated.
    pub(crate) fn reconfigure(&self) {
        if let DisplayTarget::Window { surface, config } = &self.display {
            surface.configure(&self.device, config);
        }
    }
}
