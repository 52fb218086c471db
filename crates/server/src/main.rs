mod bootstrap;
mod console;
mod health;
mod mail;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use deskbot_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "deskbot-server",
    about = "Support-request chat bot",
    long_about = "Runs the support-request dialog bot. Chat envelopes are read as JSON lines from \
                  stdin and replies are written to stdout; logs go to stderr.",
    after_help = "Examples:\n  deskbot-server\n  deskbot-server --config config/deskbot.toml \
                  --require-config"
)]
struct Cli {
    #[arg(long, help = "Path to a deskbot TOML config file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Fail when the config file does not exist")]
    require_config: bool,
}

fn init_logging(config: &AppConfig) {
    use deskbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        require_file: cli.require_config,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.health_state(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        app_name = %app.config.bot.app_name,
        "deskbot-server started"
    );

    tokio::select! {
        result = app.runner.start() => {
            result?;
            tracing::info!(
                event_name = "system.server.transport_closed",
                correlation_id = "shutdown",
                "chat transport closed"
            );
        }
        result = wait_for_shutdown() => {
            result?;
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "shutdown signal received"
            );
        }
    }

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.pool_close_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
