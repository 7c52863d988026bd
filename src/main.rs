//! portfwd - TCP port forwarder
//!
//! Listens on a local port and relays every accepted connection, byte for
//! byte, to a fixed remote address.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfwd::{config::ConfigManager, Config, ForwardError, Forwarder, ShutdownCoordinator};

/// CLI arguments for portfwd
#[derive(Parser, Debug)]
#[command(name = "portfwd")]
#[command(about = "portfwd - TCP port forwarder")]
#[command(version)]
#[command(long_about = "
portfwd - TCP port forwarder

Accepts TCP connections on 0.0.0.0:<lport> and relays each one to
<rhost>:<rport>. Traffic is forwarded unmodified in both directions.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  PORTFWD_LPORT        - Local listen port
  PORTFWD_RHOST        - Remote host
  PORTFWD_RPORT        - Remote port
  PORTFWD_BUFFER_SIZE  - Copy buffer size per direction, in bytes
  PORTFWD_LOG_LEVEL    - Log level (trace, debug, info, warn, error)

There is no connect timeout, idle timeout or connection cap: a stalled peer
holds its session open until the transport fails or the process exits.
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "portfwd.toml")]
    pub config: PathBuf,

    /// Local port to listen on [default: 8001]
    #[arg(short, long)]
    pub lport: Option<u16>,

    /// Remote host to forward to [default: 127.0.0.1]
    #[arg(short, long)]
    pub rhost: Option<String>,

    /// Remote port to forward to [default: 80]
    #[arg(short = 'p', long)]
    pub rport: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("portfwd: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&args, &config);

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Listen address: {}", config.listen_addr());
        info!("  Target address: {}", config.target_addr());
        info!("  Buffer size: {} bytes", config.forward.buffer_size);
        return ExitCode::SUCCESS;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ForwardError>() {
                Some(ForwardError::Bind { addr, source }) => {
                    error!(listen_addr = %addr, "Failed to bind listener: {}", source)
                }
                None => error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

/// Load configuration with priority: CLI args > config file > environment > defaults
fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.lport,
        args.rhost.as_deref(),
        args.rport,
        args.log_level.as_deref(),
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    let forwarder = Forwarder::bind(&config).await?;

    let shutdown = ShutdownCoordinator::new();
    let server = forwarder.run(shutdown.subscribe());

    tokio::select! {
        result = server => result,
        result = shutdown.listen_for_signals() => {
            result?;
            info!("Listener closed, exiting");
            Ok(())
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &Config) {
    let log_level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .with(env_filter)
        .init();
}
