// ============================================================================
// config.rs — Luxtree
// Command line, optional JSON scene file, and the resolved runtime config.
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::analyzer::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::distribution::ShapeKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ======================== Command Line ========================

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "luxtree", version, about = "Gesture-driven particle tree")]
pub struct Cli {
    /// JSON scene/sensing config; every field is optional.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Image file kept up to date by an external frame grabber.
    #[arg(long)]
    pub frame_path: Option<PathBuf>,

    /// Sensing period in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Run without a window, logging progress once per simulated second.
    #[arg(long)]
    pub headless: bool,

    /// Simulated duration of a headless run.
    #[arg(long, default_value_t = 30)]
    pub seconds: u32,

    /// Disable the sensing loop; keyboard and panel control only.
    #[arg(long)]
    pub no_vision: bool,
}

// ======================== Scene File ========================

/// Linear RGB parsed from a `#RRGGBB` string.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Rgb(pub [f32; 3]);

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_hex_color(&value).map(Rgb)
    }
}

pub fn parse_hex_color(s: &str) -> Result<[f32; 3], String> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("expected #RRGGBB, got {s:?}"));
    }
    let mut rgb = [0.0; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| format!("bad hex digits in {s:?}"))?;
        *channel = byte as f32 / 255.0;
    }
    Ok(rgb)
}

/// One entity group: a shape, its population, and how it looks and moves.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,
    pub kind: ShapeKind,
    pub count: usize,
    #[serde(default = "default_base_scale")]
    pub base_scale: f32,
    pub rate: f32,
    pub color: Rgb,
    #[serde(default = "default_roughness")]
    pub roughness: f32,
    #[serde(default = "default_metalness")]
    pub metalness: f32,
}

fn default_base_scale() -> f32 {
    1.0
}

fn default_roughness() -> f32 {
    0.5
}

fn default_metalness() -> f32 {
    0.0
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensingSettings {
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
    pub frame_path: PathBuf,
    pub model: String,
    pub endpoint: String,
}

impl Default for SensingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            request_timeout_ms: 10_000,
            frame_path: PathBuf::from("frame.jpg"),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl SensingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    pub groups: Vec<GroupConfig>,
    pub sensing: SensingSettings,
    /// RNG seed for the distribution generator; random when absent.
    pub seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            groups: default_groups(),
            sensing: SensingSettings::default(),
            seed: None,
        }
    }
}

fn group(
    name: &str,
    kind: ShapeKind,
    count: usize,
    base_scale: f32,
    rate: f32,
    color: [f32; 3],
    roughness: f32,
    metalness: f32,
) -> GroupConfig {
    GroupConfig {
        name: name.to_string(),
        kind,
        count,
        base_scale,
        rate,
        color: Rgb(color),
        roughness,
        metalness,
    }
}

const fn hex(r: u8, g: u8, b: u8) -> [f32; 3] {
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

/// Foliage, gold baubles, red baubles, gifts.
pub fn default_groups() -> Vec<GroupConfig> {
    vec![
        group("foliage", ShapeKind::FineParticle, 15_000, 1.0, 1.5, hex(0x00, 0x66, 0x26), 1.0, 0.0),
        group("gold_baubles", ShapeKind::OrnamentBall, 200, 0.25, 1.2, hex(0xFF, 0xD7, 0x00), 0.1, 1.0),
        group("red_baubles", ShapeKind::OrnamentBall, 150, 0.2, 1.2, hex(0x8B, 0x00, 0x00), 0.2, 0.8),
        group("gifts", ShapeKind::OrnamentGift, 50, 0.4, 0.8, hex(0xC0, 0xC0, 0xC0), 0.3, 0.9),
    ]
}

impl SceneConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SceneConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensing.interval_ms == 0 {
            return Err(ConfigError::Invalid("sensing.interval_ms must be > 0".into()));
        }
        if self.sensing.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sensing.request_timeout_ms must be > 0".into(),
            ));
        }
        for g in &self.groups {
            if !(g.rate.is_finite() && g.rate > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "group {}: rate must be finite and > 0, got {}",
                    g.name, g.rate
                )));
            }
            if !(g.base_scale.is_finite() && g.base_scale > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "group {}: base_scale must be > 0, got {}",
                    g.name, g.base_scale
                )));
            }
        }
        Ok(())
    }
}

// ======================== Resolved Config ========================

/// Whether gesture sensing may run. `--no-vision` takes precedence over a
/// missing key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Vision {
    Enabled { api_key: String },
    DisabledByFlag,
    MissingKey,
}

/// Everything the app needs at startup, after file and flag overrides.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub scene: SceneConfig,
    pub vision: Vision,
    pub headless_seconds: Option<u32>,
}

impl AppConfig {
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut scene = match &cli.config {
            Some(path) => SceneConfig::from_file(path)?,
            None => SceneConfig::default(),
        };

        if let Some(path) = &cli.frame_path {
            scene.sensing.frame_path = path.clone();
        }
        if let Some(ms) = cli.interval_ms {
            scene.sensing.interval_ms = ms;
        }
        if let Some(model) = &cli.model {
            scene.sensing.model = model.clone();
        }
        if let Some(endpoint) = &cli.endpoint {
            scene.sensing.endpoint = endpoint.clone();
        }
        scene.validate()?;

        let api_key = cli.api_key.clone().filter(|k| !k.trim().is_empty());
        let vision = match api_key {
            _ if cli.no_vision => Vision::DisabledByFlag,
            Some(api_key) => Vision::Enabled { api_key },
            None => Vision::MissingKey,
        };

        Ok(Self {
            scene,
            vision,
            headless_seconds: cli.headless.then_some(cli.seconds),
        })
    }
}

/// Runtime display parameters adjustable via keyboard.
#[derive(Clone, Debug)]
pub struct DisplayParams {
    pub show_panel: bool,
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self {
            show_panel: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_group_table() {
        let scene = SceneConfig::default();
        let counts: Vec<_> = scene.groups.iter().map(|g| (g.name.as_str(), g.count)).collect();
        assert_eq!(
            counts,
            [("foliage", 15_000), ("gold_baubles", 200), ("red_baubles", 150), ("gifts", 50)]
        );
        assert_eq!(scene.sensing.interval(), Duration::from_millis(1000));
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let scene = SceneConfig::from_json("{}").unwrap();
        assert_eq!(scene.groups.len(), 4);
        assert_eq!(scene.sensing.model, DEFAULT_MODEL);
    }

    #[test]
    fn parses_custom_groups() {
        let scene = SceneConfig::from_json(
            r##"{
                "groups": [
                    { "name": "snow", "kind": "FINE_PARTICLE", "count": 500, "rate": 2.0, "color": "#FFFFFF" }
                ],
                "sensing": { "interval_ms": 500 }
            }"##,
        )
        .unwrap();
        assert_eq!(scene.groups.len(), 1);
        assert_eq!(scene.groups[0].kind, ShapeKind::FineParticle);
        assert_eq!(scene.groups[0].color, Rgb([1.0, 1.0, 1.0]));
        assert_eq!(scene.sensing.interval_ms, 500);
        assert_eq!(scene.sensing.request_timeout_ms, 10_000);
    }

    #[test]
    fn rejects_bad_values() {
        let zero_interval = SceneConfig::from_json(r#"{ "sensing": { "interval_ms": 0 } }"#);
        assert!(matches!(zero_interval, Err(ConfigError::Invalid(_))));

        let bad_rate = SceneConfig::from_json(
            r##"{ "groups": [{ "name": "g", "kind": "ORNAMENT_BALL", "count": 1, "rate": -1.0, "color": "#000000" }] }"##,
        );
        assert!(matches!(bad_rate, Err(ConfigError::Invalid(_))));

        let bad_color = SceneConfig::from_json(
            r#"{ "groups": [{ "name": "g", "kind": "ORNAMENT_BALL", "count": 1, "rate": 1.0, "color": "gold" }] }"#,
        );
        assert!(matches!(bad_color, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#FF0000").unwrap(), [1.0, 0.0, 0.0]);
        assert_eq!(parse_hex_color("00ff00").unwrap(), [0.0, 1.0, 0.0]);
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#GG0000").is_err());
    }

    #[test]
    fn cli_overrides_and_vision_gate() {
        let cli = Cli::parse_from(["luxtree", "--interval-ms", "250", "--api-key", "k", "--headless", "--seconds", "5"]);
        let config = AppConfig::resolve(&cli).unwrap();
        assert_eq!(config.scene.sensing.interval_ms, 250);
        assert_eq!(config.vision, Vision::Enabled { api_key: "k".into() });
        assert_eq!(config.headless_seconds, Some(5));

        let cli = Cli::parse_from(["luxtree", "--api-key", "k", "--no-vision"]);
        assert_eq!(AppConfig::resolve(&cli).unwrap().vision, Vision::DisabledByFlag);

        let cli = Cli {
            api_key: Some("  ".into()),
            ..Cli::default()
        };
        assert_eq!(AppConfig::resolve(&cli).unwrap().vision, Vision::MissingKey);

        // The flag wins even when there is no key to disable
        let cli = Cli::parse_from(["luxtree", "--no-vision"]);
        assert_eq!(AppConfig::resolve(&cli).unwrap().vision, Vision::DisabledByFlag);

        let cli = Cli::parse_from(["luxtree", "--interval-ms", "0"]);
        assert!(matches!(AppConfig::resolve(&cli), Err(ConfigError::Invalid(_))));
    }
}
