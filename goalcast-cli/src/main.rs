//! Goalcast CLI: batch training of dual-target regression experiments and
//! Prometheus exposition of their tracked metrics.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Goalcast: config-driven experiments with MLflow tracking
#[derive(Parser, Debug)]
#[command(name = "goalcast", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory (holds goalcast.toml and the configs directory)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Settings file, replacing <workspace>/goalcast.toml
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// List experiment configurations grouped by model type
    List,
    /// Run every configuration
    RunAll,
    /// Run the configurations matching a path pattern and/or model type
    RunFiltered {
        /// Case-insensitive substring of the configuration path
        #[arg(short, long)]
        pattern: Option<String>,
        /// Case-insensitive substring of the declared model_type
        #[arg(short, long)]
        model_type: Option<String>,
    },
    /// Train and register a single configuration
    Run {
        /// Path to the experiment configuration file
        config: PathBuf,
        /// Discard the run when training takes longer than this
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the metrics exposition once
    Metrics,
    /// Serve the metrics exposition over HTTP
    ServeMetrics {
        /// Listen address, overriding bridge.bind
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Interactive menu
    Menu,
    /// Print the effective settings
    Settings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "goalcast", "goalcast")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "goalcast.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let settings = goalcast_core::load_settings(Some(&workspace), cli.settings.as_deref())
        .map_err(|e| anyhow::anyhow!("Settings error: {}", e))?;

    let ctx = commands::Context::new(workspace, cli.settings.clone(), settings)?;
    commands::handle_command(cli.command, &ctx).await
}
