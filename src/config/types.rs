//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ip_allow::{IpAllowResult, MethodRegistry, DEFAULT_GRACE_DELAY};

/// Root configuration structure for the IP allow gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway identity.
    pub gateway: GatewaySection,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// IP allow engine configuration.
    pub ip_allow: IpAllowConfig,
}

/// Gateway section configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Gateway instance name.
    pub name: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            name: "r0n-gateway".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: LogLevel,

    /// Log format (json, pretty, compact).
    pub format: LogFormat,

    /// Output destination.
    pub output: LogOutput,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level (default).
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level (least verbose).
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable).
    Json,
    /// Pretty format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output (default).
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}

/// `[ip_allow]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpAllowConfig {
    /// Rules file. Relative paths resolve against the configuration file's directory.
    pub rules_file: PathBuf,

    /// Reload the rules file when it changes.
    pub hot_reload: bool,

    /// How often the rules file is checked for changes, in seconds.
    pub poll_interval_secs: u64,

    /// How long a replaced table is held after a reload, in seconds.
    pub grace_delay_secs: u64,

    /// Method names appended to the well-known methods.
    pub extra_methods: Vec<String>,
}

impl Default for IpAllowConfig {
    fn default() -> Self {
        Self {
            rules_file: PathBuf::from("ip_allow.config"),
            hot_reload: true,
            poll_interval_secs: 5,
            grace_delay_secs: DEFAULT_GRACE_DELAY.as_secs(),
            extra_methods: Vec::new(),
        }
    }
}

impl IpAllowConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Grace delay as a [`Duration`].
    #[must_use]
    pub fn grace_delay(&self) -> Duration {
        Duration::from_secs(self.grace_delay_secs)
    }

    /// Make `rules_file` absolute relative to `base_dir`.
    pub fn resolve_rules_file(&mut self, base_dir: &Path) {
        if self.rules_file.is_relative() {
            self.rules_file = base_dir.join(&self.rules_file);
        }
    }

    /// Method registry with the well-known methods plus `extra_methods`.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate names or more methods than a mask holds.
    pub fn method_registry(&self) -> IpAllowResult<MethodRegistry> {
        MethodRegistry::standard().extend(&self.extra_methods)
    }
}
