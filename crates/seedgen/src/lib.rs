use std::fmt;
use std::str::FromStr;

use rand::prelude::*;

/// Bytes per cell; all four channels carry the same value.
pub const BYTES_PER_CELL: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeedError {
    #[error("unknown seed mode '{0}' (expected random, binary, empty, full or center)")]
    UnknownMode(String),
    #[error("cannot seed an empty grid ({width}x{height})")]
    EmptyGrid { width: u32, height: u32 },
}

/// How initial state is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedMode {
    /// Uniform random value per cell.
    #[default]
    Random,
    /// Each cell fully on or off with equal odds.
    Binary,
    /// Every cell off.
    Empty,
    /// Every cell fully on.
    Full,
    /// A filled square in the middle of an empty grid.
    Center,
}

impl SeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedMode::Random => "random",
            SeedMode::Binary => "binary",
            SeedMode::Empty => "empty",
            SeedMode::Full => "full",
            SeedMode::Center => "center",
        }
    }
}

impl fmt::Display for SeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeedMode {
    type Err = SeedError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "random" | "noise" => Ok(SeedMode::Random),
            "binary" => Ok(SeedMode::Binary),
            "empty" | "clear" => Ok(SeedMode::Empty),
            "full" => Ok(SeedMode::Full),
            "center" | "centre" => Ok(SeedMode::Center),
            other => Err(SeedError::UnknownMode(other.to_string())),
        }
    }
}

/// Builds `width * height * 4` RGBA8 bytes, bottom row first. The same
/// `seed` always yields the same bytes.
pub fn generate_state(
    width: u32,
    height: u32,
    mode: SeedMode,
    seed: u64,
) -> Result<Vec<u8>, SeedError> {
    if width == 0 || height == 0 {
        return Err(SeedError::EmptyGrid { width, height });
    }
    let cells = width as usize * height as usize;
    let mut rng = StdRng::seed_from_u64(seed);

    let values: Vec<u8> = match mode {
        SeedMode::Random => (0..cells).map(|_| rng.gen::<u8>()).collect(),
        SeedMode::Binary => (0..cells)
            .map(|_| if rng.gen_bool(0.5) { u8::MAX } else { 0 })
            .collect(),
        SeedMode::Empty => vec![0; cells],
        SeedMode::Full => vec![u8::MAX; cells],
        SeedMode::Center => center_square(width, height),
    };

    let mut bytes = Vec::with_capacity(cells * BYTES_PER_CELL);
    for value in values {
        bytes.extend_from_slice(&[value; BYTES_PER_CELL]);
    }
    Ok(bytes)
}

fn center_square(width: u32, height: u32) -> Vec<u8> {
    let side = (width.min(height) / 8).max(1);
    let left = (width - side) / 2;
    let bottom = (height - side) / 2;
    let mut values = vec![0; width as usize * height as usize];
    for row in bottom..bottom + side {
        let start = (row * width + left) as usize;
        values[start..start + side as usize].fill(u8::MAX);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!("random".parse::<SeedMode>().unwrap(), SeedMode::Random);
        assert_eq!(" Centre ".parse::<SeedMode>().unwrap(), SeedMode::Center);
        assert_eq!(
            "plaid".parse::<SeedMode>(),
            Err(SeedError::UnknownMode("plaid".into()))
        );
        assert_eq!(SeedMode::Binary.to_string(), "binary");
    }

    #[test]
    fn random_state_is_deterministic() {
        let a = generate_state(16, 9, SeedMode::Random, 7).unwrap();
        let b = generate_state(16, 9, SeedMode::Random, 7).unwrap();
        let c = generate_state(16, 9, SeedMode::Random, 8).unwrap();
        assert_eq!(a.len(), 16 * 9 * 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn channels_are_equal_per_cell() {
        for mode in [SeedMode::Random, SeedMode::Binary, SeedMode::Center] {
            let bytes = generate_state(12, 7, mode, 3).unwrap();
            for cell in bytes.chunks(BYTES_PER_CELL) {
                assert!(cell.iter().all(|channel| *channel == cell[0]));
            }
        }
    }

    #[test]
    fn binary_cells_are_on_or_off() {
        let bytes = generate_state(10, 10, SeedMode::Binary, 1).unwrap();
        assert!(bytes.iter().all(|byte| *byte == 0 || *byte == u8::MAX));
    }

    #[test]
    fn center_fills_middle_square() {
        let bytes = generate_state(16, 16, SeedMode::Center, 0).unwrap();
        let lit: Vec<_> = bytes
            .chunks(BYTES_PER_CELL)
            .enumerate()
            .filter(|(_, cell)| cell[3] == u8::MAX)
            .map(|(index, _)| (index % 16, index / 16))
            .collect();
        assert_eq!(lit, vec![(7, 7), (8, 7), (7, 8), (8, 8)]);
    }

    #[test]
    fn rejects_empty_grid() {
        assert_eq!(
            generate_state(0, 3, SeedMode::Full, 0),
            Err(SeedError::EmptyGrid {
                width: 0,
                height: 3
            })
        );
    }
}
