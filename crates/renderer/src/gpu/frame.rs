use wgpu::util::DeviceExt;

use super::pipeline::{ProgramLayouts, ShaderProgram};
use super::surface::{StateSlot, StateSurface};
use super::uniforms::AutomatonUniforms;

/// Which branch of the fragment template a draw runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// `doStep` true: convolution and activation.
    Update,
    /// `doStep` false: color mask and optional cumulative display.
    ColorMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    Slot(StateSlot),
    Display,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub step: StepMode,
    pub input: StateSlot,
    pub target: DrawTarget,
}

/// The four draws of one tick plus the input the following tick reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    pub draws: [DrawCall; 4],
    pub next_active: StateSlot,
}

/// Plans a tick reading `active`, which is Seed or Masked.
///
/// 1. update `active` into Raw
/// 2. update Raw onto the display
/// 3. mask Raw into Masked
/// 4. mask Masked onto the display (overwrites draw 2)
///
/// Masked feeds the next tick, so after the first tick the seed is never
/// read again until the surface is re-initialised. Draw 4 overwrites draw 2,
/// so only the masked state is visible.
pub fn plan_tick(active: StateSlot) -> FramePlan {
    FramePlan {
        draws: [
            DrawCall {
                step: StepMode::Update,
                input: active,
                target: DrawTarget::Slot(StateSlot::Raw),
            },
            DrawCall {
                step: StepMode::Update,
                input: StateSlot::Raw,
                target: DrawTarget::Display,
            },
            DrawCall {
                step: StepMode::ColorMask,
                input: StateSlot::Raw,
                target: DrawTarget::Slot(StateSlot::Masked),
            },
            DrawCall {
                step: StepMode::ColorMask,
                input: StateSlot::Masked,
                target: DrawTarget::Display,
            },
        ],
        next_active: StateSlot::Masked,
    }
}

/// Borrowed GPU objects a tick is recorded against.
pub(crate) struct FrameEncoder<'a> {
    pub device: &'a wgpu::Device,
    pub layouts: &'a ProgramLayouts,
    pub program: &'a ShaderProgram,
    pub surface: &'a StateSurface,
    pub uniform_buffer: &'a wgpu::Buffer,
    pub uniform_bind_group: &'a wgpu::BindGroup,
    pub uniforms: AutomatonUniforms,
}

impl FrameEncoder<'_> {
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        plan: &FramePlan,
        display: &wgpu::TextureView,
    ) {
        for draw in &plan.draws {
            self.encode_draw(encoder, draw, display);
        }
    }

    fn encode_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        draw: &DrawCall,
        display: &wgpu::TextureView,
    ) {
        let present = draw.target == DrawTarget::Display;
        let uniforms = self
            .uniforms
            .for_draw(draw.step == StepMode::Update, present);

        // Stage per draw: a queue write would land before the whole submission.
        let staging = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform staging"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        encoder.copy_buffer_to_buffer(
            &staging,
            0,
            self.uniform_buffer,
            0,
            std::mem::size_of::<AutomatonUniforms>() as u64,
        );

        let (view, pipeline, label) = match draw.target {
            DrawTarget::Slot(slot) => (
                &self.surface.slot(slot).view,
                &self.program.offscreen,
                "state pass",
            ),
            DrawTarget::Display => (display, &self.program.display, "display pass"),
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, self.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &self.surface.slot(draw.input).bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.layouts.quad.slice(..));
        render_pass.draw(0..6, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_reads_seed_and_hands_off_to_masked() {
        let plan = plan_tick(StateSlot::Seed);
        assert_eq!(plan.draws[0].input, StateSlot::Seed);
        assert_eq!(plan.draws[0].target, DrawTarget::Slot(StateSlot::Raw));
        assert_eq!(plan.next_active, StateSlot::Masked);
    }

    #[test]
    fn later_ticks_read_previous_masked_output() {
        let plan = plan_tick(StateSlot::Masked);
        let steps: Vec<_> = plan.draws.iter().map(|draw| draw.step).collect();
        assert_eq!(
            steps,
            vec![
                StepMode::Update,
                StepMode::Update,
                StepMode::ColorMask,
                StepMode::ColorMask
            ]
        );
        assert_eq!(plan.draws[0].input, StateSlot::Masked);
        assert_eq!(plan.draws[3].input, StateSlot::Masked);
        assert_eq!(plan.draws[3].target, DrawTarget::Display);
    }

    #[test]
    fn no_draw_samples_its_own_target() {
        for active in [StateSlot::Seed, StateSlot::Masked] {
            for draw in plan_tick(active).draws {
                assert_ne!(draw.target, DrawTarget::Slot(draw.input));
            }
        }
    }

    #[test]
    fn last_display_draw_shows_masked_state() {
        let plan = plan_tick(StateSlot::Seed);
        let last_display = plan
            .draws
            .iter()
            .rev()
            .find(|draw| draw.target == DrawTarget::Display)
            .unwrap();
        assert_eq!(last_display.input, StateSlot::Masked);
        assert_eq!(last_display.step, StepMode::ColorMask);
    }
}
