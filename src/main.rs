use std::sync::Arc;

use clap::{Parser, Subcommand};
use conduit::launcher::{ContainerLauncher, HostProcessLauncher, Launcher};
use conduit::{Orchestrator, load_topology};

/// conduit - Hypergraph pipeline orchestrator for streaming phases
#[derive(Parser)]
#[command(name = "conduit")]
#[command(version = "0.1.0")]
#[command(about = "Hypergraph pipeline orchestrator: phase supervision and multicast stream routing")]
struct Cli {
    /// Topology configuration file path
    #[arg(short, long, default_value = "./config/topology.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Launch phases as host processes (default) or shelled-out containers
    #[arg(long, value_enum, default_value = "host-process")]
    launcher: LauncherKind,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, clap::ValueEnum)]
enum LauncherKind {
    HostProcess,
    Container,
}

#[derive(Subcommand)]
enum Command {
    /// Start the pipeline and run until interrupted
    Start,
    /// Scale a phase to a target replica count
    Scale { phase: String, target: u32 },
    /// Restart a single replica of a phase
    Restart { phase: String, replica_id: u32 },
    /// Print the current status snapshot as JSON
    Status,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 32)]
async fn main() {
    let cli = Cli::parse();
    conduit::logging::init_logging(&cli.log_level);

    let loaded = match load_topology(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("failed to load config from '{}': {e:#}", cli.config);
            std::process::exit(1);
        }
    };

    let launcher: Arc<dyn Launcher> = match cli.launcher {
        LauncherKind::HostProcess => Arc::new(HostProcessLauncher::default()),
        LauncherKind::Container => Arc::new(ContainerLauncher::default()),
    };

    let orchestrator = Orchestrator::new(
        loaded.topology,
        launcher,
        loaded.options,
        loaded.consumer_endpoints,
    );

    match cli.command.unwrap_or(Command::Start) {
        Command::Start => {
            if let Err(e) = orchestrator.start_pipeline().await {
                tracing::error!("pipeline failed to start: {e}");
                std::process::exit(1);
            }
            tracing::info!("pipeline started; press Ctrl-C to stop");

            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("failed to install Ctrl-C handler; blocking forever");
                std::future::pending::<()>().await;
            }

            tracing::info!("shutdown requested, stopping pipeline");
            if let Err(e) = orchestrator.stop_pipeline().await {
                tracing::error!("pipeline failed to stop cleanly: {e}");
                std::process::exit(1);
            }
        }
        Command::Scale { phase, target } => {
            if let Err(e) = orchestrator.scale(&phase, target).await {
                tracing::error!("scale failed: {e}");
                std::process::exit(1);
            }
        }
        Command::Restart { phase, replica_id } => {
            if let Err(e) = orchestrator.restart(&phase, replica_id).await {
                tracing::error!("restart failed: {e}");
                std::process::exit(1);
            }
        }
        Command::Status => {
            let status = orchestrator.status().await;
            match serde_json::to_string_pretty(&status) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!("failed to serialize status: {e}"),
            }
        }
    }
}
