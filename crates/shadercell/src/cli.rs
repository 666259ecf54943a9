use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::{ColorMask, Kernel, KERNEL_LEN};
use seedgen::SeedMode;

#[derive(Parser, Debug)]
#[command(
    name = "shadercell",
    author,
    version,
    about = "GPU cellular automaton driven by GLSL rules",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Preset TOML file providing shader, brush, and run settings.
    #[arg(long, value_name = "FILE", env = "SHADERCELL_PRESET", global = true)]
    pub preset: Option<PathBuf>,

    /// Grid size (e.g. `640x480`); the window opens at this size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, global = true)]
    pub size: Option<(u32, u32)>,

    /// File containing the GLSL `activation(float x)` function.
    #[arg(long, value_name = "FILE", global = true)]
    pub activation: Option<PathBuf>,

    /// Vertex template file.
    #[arg(long, value_name = "FILE", global = true)]
    pub vertex: Option<PathBuf>,

    /// Fragment template file containing the substitution markers.
    #[arg(long, value_name = "FILE", global = true)]
    pub fragment: Option<PathBuf>,

    /// Accumulate the current state into the displayed value.
    #[arg(long, global = true)]
    pub cumulative: bool,

    /// Nine comma-separated convolution weights, bottom-left to top-right.
    #[arg(long, value_name = "W0,..,W8", value_parser = parse_kernel, allow_hyphen_values = true, global = true)]
    pub kernel: Option<Kernel>,

    /// Color mask as `R,G,B` in [0, 1].
    #[arg(long, value_name = "R,G,B", value_parser = parse_color, global = true)]
    pub color: Option<ColorMask>,

    /// Brush edge length in cells.
    #[arg(long, value_name = "CELLS", value_parser = parse_brush_size, global = true)]
    pub brush_size: Option<u32>,

    /// Brush fill value in [0, 1].
    #[arg(long, value_name = "VALUE", value_parser = parse_unit, global = true)]
    pub brush_value: Option<f32>,

    /// Initial state layout: `random`, `binary`, `empty`, `full`, or `center`.
    #[arg(long, value_name = "MODE", value_parser = parse_seed_mode, global = true)]
    pub seed_mode: Option<SeedMode>,

    /// Seed for the random state generator.
    #[arg(long, value_name = "SEED", global = true)]
    pub seed: Option<u64>,

    /// Maximum ticks per second (0 = one tick per redraw).
    #[arg(long, value_name = "FPS", global = true)]
    pub fps: Option<f32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run without a window and write the final state as a PNG.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// Number of ticks to run before capturing.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub ticks: u64,

    /// Destination PNG path.
    #[arg(long, value_name = "PATH", value_parser = parse_png_path)]
    pub output: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in size".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in size".to_string())?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".into());
    }
    Ok((width, height))
}

fn parse_floats(value: &str, what: &str) -> Result<Vec<f32>, String> {
    value
        .split(',')
        .map(|part| {
            let trimmed = part.trim();
            trimmed
                .parse::<f32>()
                .ok()
                .filter(|number| number.is_finite())
                .ok_or_else(|| format!("invalid {what} value '{trimmed}'"))
        })
        .collect()
}

pub fn parse_kernel(value: &str) -> Result<Kernel, String> {
    let weights = parse_floats(value, "kernel")?;
    Kernel::from_slice(&weights).ok_or_else(|| {
        format!(
            "kernel needs {KERNEL_LEN} weights, found {}",
            weights.len()
        )
    })
}

pub fn parse_color(value: &str) -> Result<ColorMask, String> {
    let channels = parse_floats(value, "color")?;
    let rgb: [f32; 3] = channels
        .as_slice()
        .try_into()
        .map_err(|_| format!("color needs 3 channels, found {}", channels.len()))?;
    Ok(ColorMask::from(rgb))
}

pub fn parse_unit(value: &str) -> Result<f32, String> {
    let parsed = value
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("invalid number '{}'", value.trim()))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(format!("{parsed} is outside [0, 1]"));
    }
    Ok(parsed)
}

pub fn parse_brush_size(value: &str) -> Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err("brush size must be greater than zero".into()),
        Ok(size) => Ok(size),
        Err(_) => Err(format!("invalid brush size '{}'", value.trim())),
    }
}

pub fn parse_seed_mode(value: &str) -> Result<SeedMode, String> {
    value.parse::<SeedMode>().map_err(|err| err.to_string())
}

pub fn parse_png_path(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Ok(path),
        None => Err("output path has no extension; expected .png".to_string()),
        Some(other) => Err(format!("unsupported output format '.{other}'; expected .png")),
    }
}
