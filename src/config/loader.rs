//! Configuration file loader.
//!
//! Loading happens before logging is configured, so validation warnings are
//! handed back in [`LoadedConfig`] instead of being logged on the spot.

use super::error::{ConfigError, ConfigResult};
use super::types::GatewayConfig;
use super::validation::{ValidationError, ValidationResult, Validator};
use std::path::Path;
use tracing::warn;

/// A validated configuration plus the warnings its validators raised.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The parsed configuration.
    pub config: GatewayConfig,
    /// Validation warnings, in validator order.
    pub warnings: Vec<ValidationError>,
}

impl LoadedConfig {
    /// Emit the collected warnings through `tracing`.
    ///
    /// Call once a subscriber is installed.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!(field = %warning.field, "{}", warning.message);
        }
    }

    /// Drop the warnings and keep the configuration.
    #[must_use]
    pub fn into_config(self) -> GatewayConfig {
        self.config
    }
}

/// Configuration loader with validation support.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// A relative `ip_allow.rules_file` is resolved against the directory
    /// holding the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Any validator reports an error
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<LoadedConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut loaded = self.load_str(&content)?;
        if let Some(dir) = path.parent() {
            loaded.config.ip_allow.resolve_rules_file(dir);
        }
        Ok(loaded)
    }

    /// Load configuration from a TOML string.
    ///
    /// `ip_allow.rules_file` is left as written.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or any validator reports an
    /// error.
    pub fn load_str(&self, content: &str) -> ConfigResult<LoadedConfig> {
        let config: GatewayConfig = toml::from_str(content)?;
        let result = self.validate(&config);

        if !result.is_valid() {
            let errors: Vec<String> = result
                .errors_only()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(ConfigError::ValidationError(errors.join("; ")));
        }

        let warnings = result.warnings().into_iter().cloned().collect();
        Ok(LoadedConfig { config, warnings })
    }

    /// Run every validator and merge their findings.
    fn validate(&self, config: &GatewayConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        for validator in &self.validators {
            result.merge(validator.validate(config));
        }
        result
    }
}
