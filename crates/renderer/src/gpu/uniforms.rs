use bytemuck::{Pod, Zeroable};

use crate::types::{FrameSettings, GridSize, KERNEL_LEN};

/// std140 mirror of the `AutomatonParams` block declared by the fragment
/// prelude. Scalars in the kernel array occupy a full vec4 slot each.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AutomatonUniforms {
    pub one_pixel: [f32; 2],
    pub do_step: f32,
    pub present: f32,
    pub color_mask: [f32; 4],
    pub kernel: [[f32; 4]; KERNEL_LEN],
}

unsafe impl Zeroable for AutomatonUniforms {}
unsafe impl Pod for AutomatonUniforms {}

impl AutomatonUniforms {
    pub fn new(size: GridSize, frame: &FrameSettings) -> Self {
        let mut uniforms = Self {
            one_pixel: [0.0; 2],
            do_step: 0.0,
            present: 0.0,
            color_mask: frame.color_mask.as_vec4(),
            kernel: [[0.0; 4]; KERNEL_LEN],
        };
        uniforms.set_grid(size);
        uniforms.set_frame(frame);
        uniforms
    }

    pub fn set_grid(&mut self, size: GridSize) {
        self.one_pixel = [1.0 / size.width as f32, 1.0 / size.height as f32];
    }

    pub fn set_frame(&mut self, frame: &FrameSettings) {
        self.color_mask = frame.color_mask.as_vec4();
        for (slot, weight) in self.kernel.iter_mut().zip(frame.kernel.weights()) {
            *slot = [*weight, 0.0, 0.0, 0.0];
        }
    }

    /// Per-draw flags: which branch of the template runs and whether the
    /// target is the presented surface.
    pub fn for_draw(&self, do_step: bool, present: bool) -> Self {
        Self {
            do_step: if do_step { 1.0 } else { 0.0 },
            present: if present { 1.0 } else { 0.0 },
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorMask, Kernel};

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(std::mem::size_of::<AutomatonUniforms>(), 176);
        assert_eq!(std::mem::offset_of!(AutomatonUniforms, do_step), 8);
        assert_eq!(std::mem::offset_of!(AutomatonUniforms, present), 12);
        assert_eq!(std::mem::offset_of!(AutomatonUniforms, color_mask), 16);
        assert_eq!(std::mem::offset_of!(AutomatonUniforms, kernel), 32);
    }

    #[test]
    fn frame_settings_fill_kernel_and_mask() {
        let frame = FrameSettings {
            kernel: Kernel([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]),
            color_mask: ColorMask::new(0.5, 0.25, 1.0),
        };
        let uniforms = AutomatonUniforms::new(GridSize::new(4, 2).unwrap(), &frame);
        assert_eq!(uniforms.one_pixel, [0.25, 0.5]);
        assert_eq!(uniforms.color_mask, [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(uniforms.kernel[8], [9.0, 0.0, 0.0, 0.0]);

        let draw = uniforms.for_draw(true, false);
        assert_eq!(draw.do_step, 1.0);
        assert_eq!(draw.present, 0.0);
        assert_eq!(draw.kernel, uniforms.kernel);
    }
}
