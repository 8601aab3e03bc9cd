//! StreamChat - terminal client for a streaming chat service
//!
#![doc = "StreamChat - terminal client for a streaming chat service"]
#![doc = "Main entry point for the StreamChat application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streamchat::chat::metrics::init_metrics_exporter;
use streamchat::cli::{Cli, Commands};
use streamchat::commands;
use streamchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);
    init_metrics_exporter();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Chat { session } => {
            if let Some(id) = session {
                tracing::debug!("Continuing session: {}", id);
            }
            commands::chat::run_chat(config, session).await?;
            Ok(())
        }
        Commands::Sessions { command } => {
            tracing::debug!("Running sessions command: {:?}", command);
            commands::sessions::handle_sessions(&config, command).await?;
            Ok(())
        }
    }
}

/// Installs the global subscriber; all output goes to stderr
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "streamchat=debug"
    } else {
        "streamchat=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (json_layer, text_layer) = if json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}
