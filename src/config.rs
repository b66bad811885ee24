//! `eqperf.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{ProfilerError, ProfilerResult, ReportFormat};

pub const DEFAULT_CONFIG_FILE: &str = "eqperf.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Entries kept per tree level in reports; 0 keeps all of them.
    #[serde(default)]
    pub top: usize,

    /// Spaces of indentation per tree level.
    #[serde(default = "default_indent")]
    pub indent: usize,

    /// Label printed after every time value.
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Default report format for CLI commands.
    #[serde(default = "default_format")]
    pub format: ReportFormat,
}

fn default_indent() -> usize {
    2
}

fn default_unit() -> String {
    "ns".to_string()
}

fn default_format() -> ReportFormat {
    ReportFormat::Pretty
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top: 0,
            indent: default_indent(),
            unit: default_unit(),
            format: default_format(),
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when it is missing or unusable.
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match Self::parse(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Loads `path`, failing on any problem. Used when a config is named explicitly.
    pub fn load(path: &Path) -> ProfilerResult<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::parse(&s)
    }

    pub fn parse(s: &str) -> ProfilerResult<Self> {
        let cfg = toml::from_str::<Config>(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ProfilerResult<()> {
        if self.unit.chars().any(char::is_whitespace) {
            return Err(ProfilerError::Config(format!(
                "unit {:?} must not contain whitespace",
                self.unit
            )));
        }
        if self.indent > 16 {
            return Err(ProfilerError::Config(format!(
                "indent {} is larger than 16",
                self.indent
            )));
        }
        Ok(())
    }
}
