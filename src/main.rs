//! R0N IP allow binary entry point.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use r0n_ipallow::config::{
    BasicValidator, ConfigLoader, ConfigResult, GatewayConfig, ReloadEvent, RulesWatcher,
    WatcherConfig,
};
use r0n_ipallow::ip_allow::{ConfigSource, ControllerOptions, IpAllowController, IpAllowHandler};
use r0n_ipallow::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "r0n-ipallow")]
#[command(author, version, about = "Source-address access control for the R0N gateway")]
struct Args {
    /// Path to the gateway configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Build the rules table, print it and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = match ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load(&args.config)
    {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = init_tracing(&loaded.config.logging) {
        eprintln!("warning: tracing already initialized: {e}");
    }
    loaded.log_warnings();
    let config = loaded.into_config();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        gateway = %config.gateway.name,
        "starting r0n-ipallow"
    );

    match run(config, args.check).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "r0n-ipallow failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: GatewayConfig, check: bool) -> ConfigResult<()> {
    let ip_allow = &config.ip_allow;

    let registry = ip_allow.method_registry()?.install()?;
    info!(methods = registry.len(), "method registry installed");
    let controller = IpAllowController::initialize(
        ConfigSource::file(&ip_allow.rules_file),
        ControllerOptions::new().with_grace_delay(ip_allow.grace_delay()),
    )?;

    if check {
        println!("{}", controller.describe());
        return Ok(());
    }

    let handler = IpAllowHandler::new(Arc::new(controller));
    let mut watcher = RulesWatcher::new(
        handler.clone(),
        WatcherConfig {
            enabled: ip_allow.hot_reload,
            ..WatcherConfig::default()
        }
        .with_poll_interval(ip_allow.poll_interval()),
    );
    let mut events = watcher.start();

    info!(
        rules = %ip_allow.rules_file.display(),
        hot_reload = ip_allow.hot_reload,
        "ip allow table active"
    );

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                ReloadEvent::Reloaded(outcome) => info!(
                    generation = outcome.generation,
                    entries = outcome.entries,
                    rejected = outcome.report.rejected,
                    "rules reloaded"
                ),
                ReloadEvent::Failed(reason) => warn!(%reason, "rules reload failed"),
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    watcher.stop().await;
    let stats = handler.stats().snapshot();
    info!(
        checked = stats.requests_checked,
        denied = stats.requests_denied,
        reloads = stats.reloads,
        reload_failures = stats.reload_failures,
        "shutting down"
    );
    Ok(())
}
