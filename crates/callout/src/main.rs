//! `uniqname` binary: loads configuration, runs the callout until SIGINT or
//! SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uniqname_callout::{Service, ServiceConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// NATS auth callout enforcing unique client names.
#[derive(Debug, Parser)]
#[command(name = "uniqname", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "UNIQNAME_CONFIG", default_value = "uniqname.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().with_current_span(true).init(),
    }
}

async fn shutdown_signal() -> Result<&'static str> {
    let mut sigint = signal(SignalKind::interrupt()).context("register SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;

    Ok(tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = ServiceConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    tracing::info!(path = %args.config.display(), accounts = ?config.accounts, "Loaded configuration");

    let shutdown = CancellationToken::new();
    let service = Service::start(config, shutdown.clone()).await.context("starting service")?;

    tokio::select! {
        signal = shutdown_signal() => {
            tracing::info!(signal = signal?, "Received shutdown signal");
            service.stop();
        },
        () = shutdown.cancelled() => {},
    }

    service.wait().await?;
    Ok(())
}
