//! Configuration file loading for redline.
//!
//! Discovers and loads `redline.toml` from the working directory (or an explicit
//! `--config` path). Merges config file settings with CLI arguments (CLI takes
//! precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use redline_core::BatesConfig;
use redline_core::settings::{DEFAULT_LEDGER, DEFAULT_PAYLOAD};
use redline_edit::DEFAULT_STAMP_MARGIN;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "redline.toml";

const DEFAULT_JOBS: usize = 4;

/// Top-level configuration from redline.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedlineConfig {
    pub ledger: LedgerConfig,
    pub apply: ApplyConfig,
    pub plan: PlanConfig,
    pub bates: BatesSection,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Audit ledger location.
    pub path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Fail the whole apply when a redaction cannot be located.
    pub strict_redactions: bool,

    /// Distance in points between a Bates stamp and the page corner.
    pub stamp_margin: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// File holding the hex-encoded 32-byte key used for sealed plans.
    pub key_file: Option<Utf8PathBuf>,

    /// Replacement label for term redactions.
    pub default_payload: Option<String>,
}

/// Defaults for Bates numbering. Numbering itself is only enabled from the
/// command line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatesSection {
    pub prefix: Option<String>,
    pub start: Option<u64>,
    pub width: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub jobs: Option<usize>,
}

/// Discover the redline.toml config file in `dir`.
pub fn discover_config(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a redline.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<RedlineConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<RedlineConfig> {
    let config: RedlineConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load the explicit config file if one was given, otherwise discover one in
/// `dir`, otherwise fall back to defaults. An explicit path must exist.
pub fn load_or_default(
    explicit: Option<&Utf8Path>,
    dir: &Utf8Path,
) -> anyhow::Result<RedlineConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => match discover_config(dir) {
            Some(path) => load_config(&path),
            None => Ok(RedlineConfig::default()),
        },
    }
}

/// Bates flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct BatesArgs {
    pub prefix: Option<String>,
    pub start: Option<u64>,
    pub width: Option<usize>,
}

impl BatesArgs {
    fn requested(&self) -> bool {
        self.prefix.is_some() || self.start.is_some() || self.width.is_some()
    }
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: RedlineConfig,
}

impl ConfigMerger {
    pub fn new(config: RedlineConfig) -> Self {
        Self { config }
    }

    pub fn ledger_path(&self, cli: Option<&Utf8Path>) -> Utf8PathBuf {
        cli.map(Utf8Path::to_path_buf)
            .or_else(|| self.config.ledger.path.clone())
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_LEDGER))
    }

    pub fn key_file(&self, cli: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
        cli.map(Utf8Path::to_path_buf)
            .or_else(|| self.config.plan.key_file.clone())
    }

    pub fn payload(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.config.plan.default_payload.clone())
            .unwrap_or_else(|| DEFAULT_PAYLOAD.to_string())
    }

    /// Bates numbering is enabled when any `--bates-*` flag is given; fields
    /// left off the command line come from `[bates]`, then the defaults.
    pub fn bates(&self, cli: &BatesArgs) -> Option<BatesConfig> {
        if !cli.requested() {
            return None;
        }
        let file = &self.config.bates;
        let default = BatesConfig::default();
        Some(BatesConfig {
            prefix: cli
                .prefix
                .clone()
                .or_else(|| file.prefix.clone())
                .unwrap_or(default.prefix),
            start: cli.start.or(file.start).unwrap_or(default.start),
            width: cli.width.or(file.width).unwrap_or(default.width),
        })
    }

    /// CLI `--strict` can only tighten the config file setting.
    pub fn strict_redactions(&self, cli: bool) -> bool {
        cli || self.config.apply.strict_redactions
    }

    pub fn stamp_margin(&self) -> f64 {
        self.config.apply.stamp_margin.unwrap_or(DEFAULT_STAMP_MARGIN)
    }

    pub fn jobs(&self, cli: Option<usize>) -> usize {
        cli.or(self.config.batch.jobs).unwrap_or(DEFAULT_JOBS)
    }
}

/// Parse a `key=value` annotation. Values that parse as JSON keep their type;
/// anything else is stored as a string.
pub fn parse_annotation(entry: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid annotation '{}': expected key=value", entry))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("invalid annotation '{}': missing key", entry);
    }
    let value = value.trim();
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
