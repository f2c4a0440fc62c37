//! # Configuration System
//!
//! TOML-based configuration for the IP allow gateway, plus the rules file
//! watcher that drives hot reloads.
//!
//! ## Example Configuration
//!
//! ```toml
//! [gateway]
//! name = "edge-1"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [ip_allow]
//! rules_file = "ip_allow.config"
//! hot_reload = true
//! poll_interval_secs = 5
//! grace_delay_secs = 60
//! extra_methods = ["PROPFIND"]
//! ```

mod error;
mod loader;
mod types;
mod validation;
mod watcher;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, LoadedConfig};
pub use types::{
    GatewayConfig, GatewaySection, IpAllowConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
pub use watcher::{ReloadEvent, RulesWatcher, WatcherConfig};
