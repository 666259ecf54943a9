use crate::types::{BrushConfig, GridSize};

use super::surface::StateSurface;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum BrushError {
    #[error("brush size must be positive")]
    ZeroSize,
    #[error("brush value {0} is outside [0, 1]")]
    ValueOutOfRange(f32),
    #[error("brush size {size} exceeds the limit of {max}")]
    TooLarge { size: u32, max: u32 },
}

/// Brush edge limit when no device limit is known; matches wgpu's default
/// `max_texture_dimension_2d`.
pub const DEFAULT_MAX_BRUSH_SIZE: u32 = 8192;

/// Texel rectangle a poke writes, already clipped to the grid. `y` counts
/// rows from the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrushRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Square brush stamped into the active state texture.
///
/// The fill buffer is rebuilt on `set_brush` so a poke is a single texture
/// write of a prefix of it.
#[derive(Debug, Clone)]
pub struct BrushEditor {
    size: u32,
    value: f32,
    max_size: u32,
    fill: Vec<u8>,
}

/// Byte written for a brush value; truncates like an integer cast.
pub fn fill_byte(value: f32) -> u8 {
    (value * 255.0) as u8
}

impl BrushEditor {
    pub fn new(config: BrushConfig) -> Result<Self, BrushError> {
        Self::with_max_size(config, DEFAULT_MAX_BRUSH_SIZE)
    }

    /// Editor whose brush may not be wider than `max_size` texels. A larger
    /// brush would be clipped to the grid on every poke anyway.
    pub fn with_max_size(config: BrushConfig, max_size: u32) -> Result<Self, BrushError> {
        let mut editor = Self {
            size: 0,
            value: 0.0,
            max_size,
            fill: Vec::new(),
        };
        editor.set_brush(config.size, config.value)?;
        Ok(editor)
    }

    pub fn set_brush(&mut self, size: u32, value: f32) -> Result<(), BrushError> {
        if size == 0 {
            return Err(BrushError::ZeroSize);
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(BrushError::ValueOutOfRange(value));
        }
        let too_large = BrushError::TooLarge {
            size,
            max: self.max_size,
        };
        if size > self.max_size {
            return Err(too_large);
        }
        let len = (size as usize)
            .checked_mul(size as usize)
            .and_then(|cells| cells.checked_mul(4))
            .ok_or(too_large)?;
        self.size = size;
        self.value = value;
        self.fill = vec![fill_byte(value); len];
        tracing::debug!(size, value, "brush updated");
        Ok(())
    }

    pub fn config(&self) -> BrushConfig {
        BrushConfig {
            size: self.size,
            value: self.value,
        }
    }

    pub fn fill(&self) -> &[u8] {
        &self.fill
    }

    /// Region covered by a poke at window pixel `(x, y)`, measured from the
    /// top-left corner. Returns `None` when the brush misses the grid.
    pub fn region(&self, x: f64, y: f64, grid: GridSize) -> Option<BrushRegion> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let half = i64::from(self.size / 2);
        let size = i64::from(self.size);
        let left = x.floor() as i64 - half;
        let bottom = (f64::from(grid.height) - y).floor() as i64 - half;

        let x0 = left.max(0);
        let y0 = bottom.max(0);
        let x1 = (left + size).min(i64::from(grid.width));
        let y1 = (bottom + size).min(i64::from(grid.height));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(BrushRegion {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// Writes the brush into the active input of `surface`.
    pub(crate) fn poke(&self, queue: &wgpu::Queue, surface: &StateSurface, x: f64, y: f64) {
        let Some(region) = self.region(x, y, surface.size()) else {
            tracing::debug!(x, y, "brush outside the grid; ignoring poke");
            return;
        };
        let len = region.width as usize * region.height as usize * 4;
        let target = surface.slot(surface.active());
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &self.fill[..len],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width * 4),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brush(size: u32) -> BrushEditor {
        BrushEditor::new(BrushConfig { size, value: 1.0 }).unwrap()
    }

    fn grid(width: u32, height: u32) -> GridSize {
        GridSize::new(width, height).unwrap()
    }

    #[test]
    fn fill_byte_truncates() {
        assert_eq!(fill_byte(1.0), 255);
        assert_eq!(fill_byte(0.0), 0);
        assert_eq!(fill_byte(0.5), 127);
    }

    #[test]
    fn set_brush_validates_inputs() {
        let mut editor = brush(3);
        assert_eq!(editor.set_brush(0, 1.0), Err(BrushError::ZeroSize));
        assert_eq!(
            editor.set_brush(2, 1.5),
            Err(BrushError::ValueOutOfRange(1.5))
        );
        assert_eq!(editor.config(), BrushConfig { size: 3, value: 1.0 });

        editor.set_brush(2, 0.5).unwrap();
        assert_eq!(editor.fill().len(), 16);
        assert!(editor.fill().iter().all(|byte| *byte == 127));
    }

    #[test]
    fn oversized_brush_is_rejected() {
        assert_eq!(
            BrushEditor::new(BrushConfig {
                size: u32::MAX,
                value: 1.0
            })
            .unwrap_err(),
            BrushError::TooLarge {
                size: u32::MAX,
                max: DEFAULT_MAX_BRUSH_SIZE
            }
        );

        let mut editor = BrushEditor::with_max_size(BrushConfig { size: 4, value: 1.0 }, 16).unwrap();
        assert_eq!(
            editor.set_brush(17, 1.0),
            Err(BrushError::TooLarge { size: 17, max: 16 })
        );
        assert_eq!(editor.config().size, 4);
        editor.set_brush(16, 1.0).unwrap();
        assert_eq!(editor.fill().len(), 16 * 16 * 4);
    }

    #[test]
    fn unit_brush_hits_flipped_row() {
        let region = brush(1).region(2.0, 3.0, grid(8, 8)).unwrap();
        assert_eq!(
            region,
            BrushRegion {
                x: 2,
                y: 5,
                width: 1,
                height: 1
            }
        );
    }

    #[test]
    fn brush_is_centred_on_the_pointer() {
        let region = brush(3).region(4.0, 4.0, grid(10, 10)).unwrap();
        assert_eq!(
            region,
            BrushRegion {
                x: 3,
                y: 5,
                width: 3,
                height: 3
            }
        );
    }

    #[test]
    fn brush_near_edge_is_clipped() {
        let region = brush(5).region(0.0, 10.0, grid(10, 10)).unwrap();
        assert_eq!(
            region,
            BrushRegion {
                x: 0,
                y: 0,
                width: 3,
                height: 3
            }
        );
    }

    #[test]
    fn brush_outside_grid_is_ignored() {
        assert!(brush(3).region(-10.0, 5.0, grid(10, 10)).is_none());
        assert!(brush(3).region(5.0, -10.0, grid(10, 10)).is_none());
        assert!(brush(1).region(5.0, 0.0, grid(10, 10)).is_none());
        assert!(brush(1).region(f64::NAN, 0.0, grid(10, 10)).is_none());
    }
}
