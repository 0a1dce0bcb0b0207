//! AFTP Hub CLI - manage local runtimes and talk to the model service.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod app;
mod commands;

use commands::{chat::ChatCommand, models::ModelsCommand, runtimes::RuntimeCommand, service::ServiceCommand};

/// AFTP Hub - local AI runtimes and model service
#[derive(Parser)]
#[command(name = "aftp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep all hub state under this directory instead of the platform dirs
    #[arg(long, global = true, env = "AFTP_ROOT")]
    root: Option<PathBuf>,

    /// Model service host (`host` or `host:port`); overrides settings and OLLAMA_HOST
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect, validate and install runtimes
    Runtimes {
        #[command(subcommand)]
        command: RuntimeCommand,
    },

    /// Show the persisted runtime registry
    Registry,

    /// Locate external tools (ollama, ffmpeg, tesseract)
    Tools,

    /// Talk to the model service
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },

    /// Manage conversations
    Chat {
        #[command(subcommand)]
        command: ChatCommand,
    },

    /// Manage registered model handles
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },

    /// Print a diagnostics report
    Diagnostics {
        /// Also probe every runtime and the model service
        #[arg(long)]
        probe: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let app = app::App::load(cli.root.as_deref(), cli.host.as_deref());

    match cli.command {
        Commands::Runtimes { command } => commands::runtimes::run(&app, command).await,
        Commands::Registry => commands::runtimes::show_registry(&app),
        Commands::Tools => commands::runtimes::tools(),
        Commands::Service { command } => commands::service::run(&app, command).await,
        Commands::Chat { command } => commands::chat::run(&app, command).await,
        Commands::Models { command } => commands::models::run(&app, command),
        Commands::Diagnostics { probe } => commands::diagnostics::run(&app, probe).await,
    }
}
