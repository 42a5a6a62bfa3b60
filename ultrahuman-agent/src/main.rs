//! Ultrahuman Agent binary
//!
//! First launch (or `--setup`) runs the configuration wizard. Afterwards the
//! agent sets up the entry, publishes to the configured hosts and refreshes
//! until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ultrahuman_agent::config::{AgentConfig, ConfigError, ENV_API_TOKEN};
use ultrahuman_agent::entity::render;
use ultrahuman_agent::http::{self, AppState};
use ultrahuman_agent::{
    setup_entry, unload_entry, EntityHost, LogHost, MqttHost, SetupError, SetupWizard,
};

#[derive(Debug, Parser)]
#[command(name = "ultrahuman-agent", version, about)]
struct Cli {
    /// Run the setup wizard even if a configuration exists
    #[arg(long)]
    setup: bool,

    /// Alternate configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Refresh once, print every entity and exit
    #[arg(long)]
    once: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "ultrahuman_agent=debug,ultrahuman_core=debug"
    } else {
        "ultrahuman_agent=info,ultrahuman_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => AgentConfig::config_file_path()?,
    };

    if cli.setup || !config_path.exists() {
        let base = AgentConfig::load_at(&config_path).await.unwrap_or_default();
        if SetupWizard::run_interactive(base, &config_path).await?.is_none() {
            return Ok(());
        }
    }

    let config = AgentConfig::load_at(&config_path)
        .await
        .context("Failed to load configuration")?;

    if cli.once {
        return run_once(&config).await;
    }

    info!("💍 Ultrahuman Agent starting...");
    run(config).await
}

/// Single refresh; prints entities, exits non-zero if the fetch failed
async fn run_once(config: &AgentConfig) -> Result<()> {
    let integration = setup_entry(config, Vec::new())
        .await
        .map_err(explain_setup_error)?;

    for state in render(integration.entities()) {
        match (&state.value, state.unit, state.available) {
            (Some(value), Some(unit), true) => println!("{}: {} {}", state.name, value, unit),
            (Some(value), None, true) => println!("{}: {}", state.name, value),
            _ => println!("{}: unavailable", state.name),
        }
    }

    unload_entry(integration).await;
    Ok(())
}

async fn run(config: AgentConfig) -> Result<()> {
    let mut hosts: Vec<Arc<dyn EntityHost>> = Vec::new();
    if config.publish.log_states {
        hosts.push(Arc::new(LogHost));
    }
    if let Some(mqtt) = &config.publish.mqtt {
        hosts.push(Arc::new(MqttHost::connect(mqtt, &config.entry)));
    }

    let integration = setup_entry(&config, hosts)
        .await
        .map_err(explain_setup_error)?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = config.publish.http_bind.clone().map(|bind| {
        let router = http::build_router(AppState {
            coordinator: Arc::clone(integration.coordinator()),
            entities: Arc::clone(integration.entities()),
        });
        tokio::spawn(async move {
            let shutdown = async {
                stop_rx.await.ok();
            };
            if let Err(e) = http::serve(&bind, router, shutdown).await {
                error!("{:#}", e);
            }
        })
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down...");

    stop_tx.send(()).ok();
    if let Some(server) = server {
        server.await.ok();
    }

    unload_entry(integration).await;
    Ok(())
}

fn explain_setup_error(e: SetupError) -> anyhow::Error {
    match e {
        SetupError::InvalidAuth => {
            anyhow::anyhow!("invalid_auth: the API rejected the token, run with --setup to replace it")
        }
        SetupError::InvalidConfig(ConfigError::MissingToken) => anyhow::anyhow!(
            "No API token found in the keyring or {}, run with --setup to enter one",
            ENV_API_TOKEN
        ),
        other => anyhow::Error::new(other).context("Setup failed"),
    }
}
