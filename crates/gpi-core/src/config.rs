//! Runtime configuration.
//!
//! Read once at load time: an optional TOML file named by `GPI_CONFIG`,
//! then individual overrides from `GPI_LOG_LEVEL`, `GPI_TOPLEVEL` and
//! `GPI_EXTRA`.

use serde::{Deserialize, Serialize};

use crate::error::{GpiError, Result};
use crate::log::Severity;

pub const ENV_CONFIG: &str = "GPI_CONFIG";
pub const ENV_LOG_LEVEL: &str = "GPI_LOG_LEVEL";
pub const ENV_TOPLEVEL: &str = "GPI_TOPLEVEL";
pub const ENV_EXTRA: &str = "GPI_EXTRA";

/// Configuration for one process attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GpiConfig {
    /// Least severe level that is logged.
    pub log_level: Severity,
    /// Name the toplevel must have; any toplevel is accepted when unset.
    pub toplevel: Option<String>,
    /// Additional adapters to activate next to the one the simulator loaded
    /// (mixed-language simulation), e.g. `["vhpi"]`.
    pub extra: Vec<String>,
    /// Settings for the proprietary-interface adapter.
    pub fli: FliConfig,
}

/// Settings for the proprietary-interface adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FliConfig {
    /// Maximum number of idle timer processes kept for reuse.
    pub timer_pool: usize,
}

impl Default for FliConfig {
    fn default() -> Self {
        Self { timer_pool: 64 }
    }
}

impl Default for GpiConfig {
    fn default() -> Self {
        Self {
            log_level: Severity::Info,
            toplevel: None,
            extra: Vec::new(),
            fli: FliConfig::default(),
        }
    }
}

impl GpiConfig {
    /// Parse a configuration from a TOML string.
    pub fn parse(input: &str) -> Result<Self> {
        let config: GpiConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a file path.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(ENV_CONFIG) {
            Some(path) if !path.trim().is_empty() => {
                Self::load(std::path::Path::new(path.trim()))?
            }
            _ => Self::default(),
        };

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.log_level = Severity::parse(&level).ok_or_else(|| GpiError::Config {
                detail: format!("{ENV_LOG_LEVEL}: unknown level '{level}'"),
            })?;
        }
        if let Some(top) = lookup(ENV_TOPLEVEL) {
            let top = top.trim();
            config.toplevel = (!top.is_empty()).then(|| top.to_string());
        }
        if let Some(extra) = lookup(ENV_EXTRA) {
            config.extra = extra
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(bad) = self
            .extra
            .iter()
            .find(|name| !matches!(name.as_str(), "vpi" | "vhpi" | "fli"))
        {
            return Err(GpiError::Config {
                detail: format!("unknown adapter '{bad}' in extra"),
            });
        }
        if self.fli.timer_pool == 0 {
            return Err(GpiError::Config {
                detail: "fli.timer-pool must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
