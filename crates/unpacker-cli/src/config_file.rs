//! `unpacker.toml` loading with command-line and environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::Deserialize;
use unpacker_core::{BackendId, ConfigError, ConfigProvider, PipelineConfig};
use unpacker_gateway::{BackendSpec, DEFAULT_TIMEOUT};

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "unpacker.toml";

/// On-disk layout. Pipeline tunables sit at the top level next to
/// `[backends]`; `[providers.<id>]` tables add or replace backend specs.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    pub providers: BTreeMap<BackendId, BackendSpec>,
    pub timeout_secs: Option<u64>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Stock backend specs overlaid with the file's `[providers]`.
    pub fn provider_specs(&self) -> BTreeMap<BackendId, BackendSpec> {
        let mut specs = BackendSpec::defaults();
        specs.extend(self.providers.clone());
        specs
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Tunable overrides, each also settable through an `UNPACKER_*` variable.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Maximum draft/evaluate cycles
    #[arg(long, env = "UNPACKER_MAX_CYCLES")]
    pub max_cycles: Option<u32>,

    /// Word limit for the main content of a draft
    #[arg(long, env = "UNPACKER_WORD_LIMIT")]
    pub word_limit: Option<usize>,

    /// Score delta at or below which a cycle counts as non-improving
    #[arg(long, env = "UNPACKER_PLATEAU_THRESHOLD")]
    pub plateau_threshold: Option<f64>,

    /// Consecutive non-improving cycles that stop the loop
    #[arg(long, env = "UNPACKER_PLATEAU_WINDOW")]
    pub plateau_window: Option<u32>,

    /// Scorer spread above which an idea is flagged as contested
    #[arg(long, env = "UNPACKER_DIVERGENCE_THRESHOLD")]
    pub divergence_threshold: Option<f64>,

    /// Lowest acceptable minimum bar
    #[arg(long, env = "UNPACKER_MINIMUM_BAR_FLOOR")]
    pub minimum_bar_floor: Option<f64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(v) = self.max_cycles {
            config.max_refinement_cycles = v;
        }
        if let Some(v) = self.word_limit {
            config.word_limit = v;
        }
        if let Some(v) = self.plateau_threshold {
            config.plateau_threshold = v;
        }
        if let Some(v) = self.plateau_window {
            config.plateau_window = v;
        }
        if let Some(v) = self.divergence_threshold {
            config.score_divergence_threshold = v;
        }
        if let Some(v) = self.minimum_bar_floor {
            config.minimum_bar_floor = v;
        }
    }
}

/// [`ConfigProvider`] over a TOML file plus overrides.
#[derive(Debug, Clone)]
pub struct TomlConfig {
    path: Option<PathBuf>,
    overrides: Overrides,
}

impl TomlConfig {
    /// An explicit `path` must exist; without one, `unpacker.toml` is used
    /// if present and defaults otherwise.
    pub fn new(path: Option<PathBuf>, overrides: Overrides) -> Self {
        Self { path, overrides }
    }

    pub fn read_file(&self) -> Result<ConfigFile, ConfigError> {
        match &self.path {
            Some(path) => read(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    read(default)
                } else {
                    Ok(ConfigFile::default())
                }
            }
        }
    }
}

fn read(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    ConfigFile::parse(&text)
}

impl TomlConfig {
    /// Apply overrides to an already-read file and validate the result.
    pub fn resolve(&self, file: &ConfigFile) -> Result<PipelineConfig, ConfigError> {
        let mut config = file.pipeline.clone();
        self.overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

impl ConfigProvider for TomlConfig {
    fn load(&self) -> Result<PipelineConfig, ConfigError> {
        self.resolve(&self.read_file()?)
    }
}
