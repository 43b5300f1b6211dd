//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. `TALKKIN_CONFIG` environment variable
//! 3. Platform config dir (`~/.config/talkkin/<module>.toml` on Linux)
//! 4. Compiled defaults
//!
//! A missing config file never prevents startup: a warning is logged and
//! compiled defaults are used. A file that exists but does not parse is a
//! configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TALKKIN_CONFIG";

/// Default per-invocation timeout for plugins and providers
pub const DEFAULT_INVOCATION_TIMEOUT_MS: u64 = 30_000;

/// Cost routing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    /// Free providers only
    #[default]
    Min,
    /// Paid providers may follow free ones (still requires `allow_paid`)
    AllowPaid,
}

/// Cost policy for translation routing
///
/// A paid provider may be attempted only when `mode == AllowPaid` **and**
/// `allow_paid == true`. Anything else keeps the chain free-only, even when
/// every free provider fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostPolicy {
    pub mode: CostMode,
    pub allow_paid: bool,
}

impl CostPolicy {
    /// Free providers only
    pub fn min() -> Self {
        Self {
            mode: CostMode::Min,
            allow_paid: false,
        }
    }

    /// Free providers first, then paid ones
    pub fn allow_paid() -> Self {
        Self {
            mode: CostMode::AllowPaid,
            allow_paid: true,
        }
    }

    /// Whether paid providers may be reached at all
    pub fn permits_paid(&self) -> bool {
        self.mode == CostMode::AllowPaid && self.allow_paid
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter (`RUST_LOG` overrides)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Per-plugin overrides applied on top of registered descriptors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOverride {
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub min_confidence: Option<f64>,
}

/// Routing configuration surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Stop after the first plugin producing a passing candidate
    pub stop_on_first_success: bool,
    /// Per plugin/provider invocation timeout
    pub invocation_timeout_ms: u64,
    /// Paid-usage ledger location (none = no ledger file)
    pub paid_usage_log: Option<PathBuf>,
    pub cost_policy: CostPolicy,
    /// Overrides keyed by plugin name
    pub plugins: BTreeMap<String, PluginOverride>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            stop_on_first_success: false,
            invocation_timeout_ms: DEFAULT_INVOCATION_TIMEOUT_MS,
            paid_usage_log: None,
            cost_policy: CostPolicy::default(),
            plugins: BTreeMap::new(),
        }
    }
}

impl RoutingConfig {
    pub fn invocation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.invocation_timeout_ms)
    }
}

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Locale used when a request carries none
    pub default_locale: String,
    pub logging: LoggingConfig,
    pub routing: RoutingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            default_locale: crate::audit::DEFAULT_LOCALE.to_string(),
            logging: LoggingConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject values no routing component can honour
    pub fn validate(&self) -> Result<()> {
        if self.routing.invocation_timeout_ms == 0 {
            return Err(Error::Config(
                "routing.invocation_timeout_ms must be greater than 0".to_string(),
            ));
        }
        for (name, over) in &self.routing.plugins {
            if let Some(min) = over.min_confidence {
                if !min.is_finite() {
                    return Err(Error::Config(format!(
                        "routing.plugins.{}.min_confidence must be a finite number",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize back to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("Encode TOML failed: {}", e)))
    }
}

/// Config file resolver following the priority order in the module docs
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    module_name: String,
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// `module_name` selects the platform file (`<module_name>.toml`)
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_path: None,
        }
    }

    /// Explicit path from the command line (highest priority)
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Platform config file location, whether or not it exists
    pub fn platform_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("talkkin").join(format!("{}.toml", self.module_name)))
    }

    /// Resolve the config file path to use, if any
    ///
    /// Explicit and environment paths are returned even if missing so the
    /// caller can warn about them; the platform path only if it exists.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        self.platform_path().filter(|p| p.exists())
    }

    /// Resolve and load configuration, falling back to compiled defaults
    pub fn load(&self) -> Result<TomlConfig> {
        match self.resolve_path() {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                TomlConfig::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Ok(TomlConfig::default())
            }
            None => {
                debug!("No config file found, using compiled defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}
