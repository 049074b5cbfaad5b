//! AFK agent entry point

use afk_agent::api::ApiServer;
use afk_agent::config::AgentConfig;
use afk_agent::observability::{init_default_logging, init_logging, LogFormat};
use afk_agent::session::bridge::BridgeSessionFactory;
use afk_agent::store::JsonFileStore;
use afk_agent::AgentController;
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn, Level};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["afk-agent.toml", "config/afk-agent.toml"];

/// Keeps a game agent online and serves its control API
#[derive(Parser)]
#[command(name = "afk-agent")]
#[command(about = "Long-lived game agent with bounded reconnection and a status API")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent and its API server
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
            init_logging(level, format, false);
        }
    }

    info!("Starting afk-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(path: Option<&PathBuf>) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        info!("Loading configuration from: {}", path.display());
        return Ok(AgentConfig::load_from_file(path)?);
    }

    let found = DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
        .ok_or("No configuration file found. Pass one with -c/--config or create afk-agent.toml")?;

    info!("Loading configuration from: {}", found.display());
    Ok(AgentConfig::load_from_file(&found)?)
}

async fn run_agent(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(agent_id = %config.agent.id, "Agent starting");

    let factory = Arc::new(BridgeSessionFactory::new(
        &config.agent.id,
        &config.agent.username,
        config.bridge.clone(),
    ));
    let store = Arc::new(JsonFileStore::new(config.store.path.clone()));
    let port = config.api.port;

    let (controller, supervisor) = AgentController::spawn(config, factory, store).await;

    let server = ApiServer::new(controller.clone(), port);
    server
        .activity()
        .record(afk_agent::api::ActivityKind::System, "Backend server started")
        .await;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let api = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    wait_for_shutdown_signal().await?;

    info!("Shutdown initiated");
    if let Err(e) = controller.shutdown().await {
        warn!(error = %e, "Supervisor already gone during shutdown");
    }
    let _ = stop_tx.send(());

    match api.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
    }
    if let Err(e) = supervisor.await {
        warn!(error = %e, "Supervisor task ended abnormally");
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down gracefully...");
    Ok(())
}

fn handle_config_command(config: &AgentConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
