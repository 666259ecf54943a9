use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const KERNEL_WEIGHTS: usize = 9;
pub const COLOR_CHANNELS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A saved automaton setup. Every section and every field is optional; CLI
/// flags override whatever is set here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Preset {
    #[serde(default)]
    pub shader: ShaderSection,
    #[serde(default)]
    pub brush: BrushSection,
    #[serde(default)]
    pub run: RunSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderSection {
    /// Inline activation function source.
    pub activation: Option<String>,
    /// Vertex template file; relative paths resolve against the preset file.
    pub vertex: Option<PathBuf>,
    /// Fragment template file; relative paths resolve against the preset file.
    pub fragment: Option<PathBuf>,
    pub cumulative: Option<bool>,
    pub kernel: Option<Vec<f32>>,
    pub color: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrushSection {
    pub size: Option<u32>,
    pub value: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    pub seed_mode: Option<String>,
    pub seed: Option<u64>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub frame_interval: Option<Duration>,
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Preset {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: Preset = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a preset file, resolving template paths against
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut preset = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            preset.resolve_paths(base);
        }
        Ok(preset)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for template in [&mut self.shader.vertex, &mut self.shader.fragment]
            .into_iter()
            .flatten()
        {
            if template.is_relative() {
                *template = base.join(&*template);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(kernel) = &self.shader.kernel {
            if kernel.len() != KERNEL_WEIGHTS {
                return Err(ConfigError::Invalid(format!(
                    "shader.kernel must have {KERNEL_WEIGHTS} weights, found {}",
                    kernel.len()
                )));
            }
            if kernel.iter().any(|weight| !weight.is_finite()) {
                return Err(ConfigError::Invalid(
                    "shader.kernel weights must be finite".into(),
                ));
            }
        }

        if let Some(color) = &self.shader.color {
            if color.len() != COLOR_CHANNELS {
                return Err(ConfigError::Invalid(format!(
                    "shader.color must have {COLOR_CHANNELS} channels, found {}",
                    color.len()
                )));
            }
        }

        if let Some(activation) = &self.shader.activation {
            if activation.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "shader.activation must not be empty".into(),
                ));
            }
        }

        if self.brush.size == Some(0) {
            return Err(ConfigError::Invalid(
                "brush.size must be greater than zero".into(),
            ));
        }

        if let Some(value) = self.brush.value {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "brush.value must be within [0, 1], found {value}"
                )));
            }
        }

        if let Some(mode) = &self.run.seed_mode {
            if mode.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "run.seed_mode must not be empty".into(),
                ));
            }
        }

        if self.run.frame_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::Invalid(
                "run.frame_interval must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    pub fn kernel(&self) -> Option<[f32; KERNEL_WEIGHTS]> {
        self.shader
            .kernel
            .as_deref()
            .and_then(|weights| weights.try_into().ok())
    }

    pub fn color(&self) -> Option<[f32; COLOR_CHANNELS]> {
        self.shader
            .color
            .as_deref()
            .and_then(|channels| channels.try_into().ok())
    }
}
