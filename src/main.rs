//! LearnLens - learning-style insights service
//!
//! Entry point for the `learnlens` binary: HTTP API server plus a few
//! maintenance and inspection commands.

mod cli;

use clap::{Parser, Subcommand};
use learnlens_core::AppConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "learnlens")]
#[command(about = "Learning-style insights from learner activity metrics", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, env = "LEARNLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Server address (overrides server.addr)
        #[arg(long)]
        addr: Option<SocketAddr>,
    },

    /// Create the database and run migrations
    Init {
        /// Also write the effective configuration to this file
        #[arg(long)]
        config_out: Option<PathBuf>,
    },

    /// Manage learner identities
    Learner {
        #[command(subcommand)]
        action: LearnerAction,
    },

    /// Generate and persist an insight for a learner
    Generate {
        /// Learner ID
        id: String,
    },

    /// Classify a learner's current metrics without persisting anything
    Preview {
        /// Learner ID
        id: String,
    },

    /// Show a learner's insight history, newest first
    History {
        /// Learner ID
        id: String,

        /// Page size (defaults to history.default_page_size)
        #[arg(long)]
        limit: Option<u32>,

        /// Entries to skip
        #[arg(long)]
        offset: Option<u32>,
    },
}

#[derive(Subcommand)]
enum LearnerAction {
    /// Register (or rename) a learner identity
    Add {
        /// Learner ID
        #[arg(long)]
        id: i64,

        /// Display name
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use specified level for our crates, but WARN for noisy external crates
    let level = level.as_str().to_lowercase();
    let filter = EnvFilter::new(format!(
        "learnlens={level},learnlens_core={level},tower_http={level},libsql=warn,hyper=warn"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("LearnLens v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { addr } => cli::serve::handle(config, addr).await?,
        Commands::Init { config_out } => cli::init::handle(config, config_out).await?,
        Commands::Learner {
            action: LearnerAction::Add { id, name },
        } => cli::learner::add(&config, id, &name).await?,
        Commands::Generate { id } => cli::insight::generate(&config, &id).await?,
        Commands::Preview { id } => cli::insight::preview(&config, &id).await?,
        Commands::History { id, limit, offset } => {
            cli::insight::history(&config, &id, limit, offset).await?
        }
    }

    Ok(())
}
