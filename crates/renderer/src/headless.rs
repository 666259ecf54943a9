use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::flip_vertical_in_place;
use image::RgbaImage;

use crate::gpu::Simulation;
use crate::runtime::ManualScheduler;
use crate::types::{GridSize, SimulationConfig};

/// Masked state captured after a headless run, bottom row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub size: GridSize,
    pub rgba: Vec<u8>,
}

impl Snapshot {
    /// Converts to a top-down image.
    pub fn to_image(&self) -> Result<RgbaImage> {
        let mut image = RgbaImage::from_raw(self.size.width, self.size.height, self.rgba.clone())
            .ok_or_else(|| anyhow!("snapshot buffer does not match {}", self.size))?;
        flip_vertical_in_place(&mut image);
        Ok(image)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.to_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))
    }
}

/// Runs `ticks` ticks without a window, driving the clock by hand, and
/// returns the masked state. `begin` runs the first tick; the rest come from
/// the scheduler queue. With zero ticks the seed is returned as uploaded.
pub fn run_headless(config: &SimulationConfig, seed: &[u8], ticks: u64) -> Result<Snapshot> {
    let scheduler = ManualScheduler::new();
    let mut simulation = Simulation::headless(config, seed, Box::new(scheduler.clone()))?;

    if ticks > 0 {
        simulation.begin()?;
        while simulation.ticks() < ticks {
            let ran = simulation.ticks();
            let token = scheduler
                .take_next()
                .ok_or_else(|| anyhow!("clock stopped requesting frames after {ran} ticks"))?;
            simulation.on_frame(token)?;
        }
        simulation.stop();
    }
    tracing::info!(ticks = simulation.ticks(), size = %simulation.size(), "headless run finished");

    Ok(Snapshot {
        size: simulation.size(),
        rgba: simulation.readback()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_is_flipped_to_top_down() {
        let size = GridSize::new(1, 2).unwrap();
        let snapshot = Snapshot {
            size,
            rgba: vec![10, 10, 10, 10, 200, 200, 200, 200],
        };
        let image = snapshot.to_image().unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [200, 200, 200, 200]);
        assert_eq!(image.get_pixel(0, 1).0, [10, 10, 10, 10]);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let snapshot = Snapshot {
            size: GridSize::new(2, 2).unwrap(),
            rgba: vec![0; 4],
        };
        assert!(snapshot.to_image().is_err());
    }
}
