//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LogOutput, LoggingConfig};

/// Install the global tracing subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(
    config: &LoggingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let registry = tracing_subscriber::registry().with(env_filter);

    match (config.format, config.output) {
        (LogFormat::Json, LogOutput::Stdout) => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        (LogFormat::Json, LogOutput::Stderr) => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Pretty, LogOutput::Stdout) => registry
            .with(fmt::layer().pretty().with_target(true))
            .try_init(),
        (LogFormat::Pretty, LogOutput::Stderr) => registry
            .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Compact, LogOutput::Stdout) => registry
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
        (LogFormat::Compact, LogOutput::Stderr) => registry
            .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    }
}
