use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use presets::Preset;
use renderer::{
    run_headless, run_window, ActivationSource, ColorMask, FramePacer, GridSize, Kernel,
    SimulationConfig,
};
use seedgen::{generate_state, SeedMode};
use tracing_subscriber::EnvFilter;

use crate::cli::{RunArgs, SnapshotArgs};

const DEFAULT_SEED: u64 = 1;

/// Everything needed to start a simulation once CLI flags and the preset
/// have been merged.
#[derive(Debug, Clone)]
pub struct Launch {
    pub config: SimulationConfig,
    pub seed_mode: SeedMode,
    pub seed: u64,
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let launch = resolve_launch(&args)?;
    tracing::info!(
        size = ?launch.config.surface_size,
        seed_mode = %launch.seed_mode,
        seed = launch.seed,
        cumulative = launch.config.shader.build.cumulative,
        "starting shadercell window"
    );

    let mode = launch.seed_mode;
    let mut next_seed = launch.seed;
    let seeds = move |size: GridSize| -> Result<Vec<u8>> {
        let seed = next_seed;
        next_seed = next_seed.wrapping_add(1);
        tracing::debug!(%size, seed, "generating state");
        Ok(generate_state(size.width, size.height, mode, seed)?)
    };
    run_window(launch.config, Box::new(seeds))
}

pub fn snapshot(args: RunArgs, snapshot: SnapshotArgs) -> Result<()> {
    let launch = resolve_launch(&args)?;
    let (width, height) = launch.config.surface_size;
    let seed = generate_state(width, height, launch.seed_mode, launch.seed)?;
    let result = run_headless(&launch.config, &seed, snapshot.ticks)?;
    result.save_png(&snapshot.output)?;
    tracing::info!(
        path = %snapshot.output.display(),
        ticks = snapshot.ticks,
        size = %result.size,
        "snapshot written"
    );
    Ok(())
}

/// Merges settings with precedence CLI flag, then preset, then defaults.
pub fn resolve_launch(args: &RunArgs) -> Result<Launch> {
    let preset = match args.preset.as_deref() {
        Some(path) => {
            let preset = Preset::load(path)
                .with_context(|| format!("failed to load preset {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded preset");
            preset
        }
        None => Preset::default(),
    };

    let mut config = SimulationConfig::default();
    if let Some(size) = args.size {
        config.surface_size = size;
    }

    if let Some(path) = args.vertex.as_deref().or(preset.shader.vertex.as_deref()) {
        config.templates.vertex = read_source(path, "vertex template")?;
    }
    if let Some(path) = args.fragment.as_deref().or(preset.shader.fragment.as_deref()) {
        config.templates.fragment = read_source(path, "fragment template")?;
    }

    let activation = match args.activation.as_deref() {
        Some(path) => Some(read_source(path, "activation")?),
        None => preset.shader.activation.clone(),
    };
    if let Some(source) = activation {
        config.shader.build.activation =
            ActivationSource::new(source).context("invalid activation function")?;
    }
    config.shader.build.cumulative =
        args.cumulative || preset.shader.cumulative.unwrap_or(false);

    if let Some(kernel) = args.kernel.or_else(|| preset.kernel().map(Kernel)) {
        config.shader.frame.kernel = kernel;
    }
    if let Some(color) = args.color.or_else(|| preset.color().map(ColorMask::from)) {
        config.shader.frame.color_mask = color;
    }

    if let Some(size) = args.brush_size.or(preset.brush.size) {
        config.brush.size = size;
    }
    if let Some(value) = args.brush_value.or(preset.brush.value) {
        config.brush.value = value;
    }

    config.frame_interval = match args.fps {
        Some(fps) => frame_interval_for_fps(fps)?,
        None => preset.run.frame_interval,
    };

    let seed_mode = match args.seed_mode {
        Some(mode) => mode,
        None => match preset.run.seed_mode.as_deref() {
            Some(raw) => raw
                .parse::<SeedMode>()
                .map_err(|err| anyhow!("preset run.seed_mode: {err}"))?,
            None => SeedMode::default(),
        },
    };
    let seed = args.seed.or(preset.run.seed).unwrap_or(DEFAULT_SEED);

    Ok(Launch {
        config,
        seed_mode,
        seed,
    })
}

fn frame_interval_for_fps(fps: f32) -> Result<Option<Duration>> {
    if !fps.is_finite() || fps < 0.0 {
        bail!("--fps must be a non-negative number, got {fps}");
    }
    Ok(FramePacer::from_fps(Some(fps)).interval())
}

fn read_source(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {what} {}", path.display()))
}
