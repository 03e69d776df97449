//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use diag_relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from sqrelay.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub vm: VmConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub callbacks: CallbacksConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VmConfig {
    #[serde(default = "default_stack_size")]
    pub stack_size: isize,
    /// Register the standard libraries and their error handlers
    #[serde(default = "default_true")]
    pub stdlib: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: default_stack_size(),
            stdlib: true,
        }
    }
}

fn default_stack_size() -> isize {
    1024
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub timestamps: bool,
    /// Write stdout/stderr sinks to this file instead of the terminal
    pub file: Option<PathBuf>,
}

impl OutputConfig {
    /// True if relayed lines need more than a plain terminal write
    pub fn is_decorated(&self) -> bool {
        self.format != OutputFormat::Text || self.timestamps || self.file.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per diagnostic
    Json,
}

/// C callbacks loaded from a shared library
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CallbacksConfig {
    pub library: Option<PathBuf>,
    /// Symbol handling print diagnostics
    pub print: Option<String>,
    /// Symbol handling error diagnostics
    pub error: Option<String>,
}

/// Load configuration from a TOML file
///
/// Only parses; call [`validate`] once command line overrides are applied.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Check settings that serde cannot express
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.vm.stack_size <= 0 {
        bail!("vm.stack_size must be positive, got {}", config.vm.stack_size);
    }

    let callbacks = &config.callbacks;
    if callbacks.library.is_none() && (callbacks.print.is_some() || callbacks.error.is_some()) {
        bail!("callbacks.print/callbacks.error need callbacks.library");
    }
    if callbacks.library.is_some() && callbacks.print.is_none() && callbacks.error.is_none() {
        log::warn!("callbacks.library is set but no callback symbols are named");
    }

    Ok(())
}
