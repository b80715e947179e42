//! trainctl CLI: validate training control policies, replay event traces
//! against them and evaluate single rules.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// trainctl: policy-driven control of training loops
#[derive(Parser, Debug)]
#[command(name = "trainctl", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (for `.trainctl/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces user and workspace config files)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Write structured JSON logs to the data directory
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Load a policy and report its controllers
    Validate {
        /// Policy document (defaults to `policy_path` from configuration)
        policy: Option<PathBuf>,
        /// Training loop configuration (YAML or JSON)
        #[arg(long)]
        loop_config: Option<PathBuf>,
    },
    /// Replay a JSONL trace of lifecycle events through a policy
    Replay {
        /// Policy document (defaults to `policy_path` from configuration)
        policy: Option<PathBuf>,
        /// Event trace, one `{"trigger", "state", "metrics"?}` object per line
        #[arg(short, long)]
        events: PathBuf,
        /// Training loop configuration (YAML or JSON)
        #[arg(long)]
        loop_config: Option<PathBuf>,
        /// Print one JSON dispatch report per event
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a single rule against a metric mapping
    Eval {
        /// Rule expression, e.g. "loss < 0.01 and epoch >= 1"
        rule: String,
        /// Metric mapping as a JSON object
        #[arg(short, long)]
        metrics: Option<String>,
        /// Read the metric mapping from a JSON file
        #[arg(long, conflicts_with = "metrics")]
        metrics_file: Option<PathBuf>,
    },
    /// List triggers, control flags and registered handler classes
    Triggers,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| filter.to_string());

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(&filter));

    // JSON file layer for structured logging
    let mut _guard = None;
    let json_layer = if cli.log_json {
        let log_dir = directories::ProjectDirs::from("dev", "trainctl", "trainctl")
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("."));
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "trainctl.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug")),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = match &cli.config {
        Some(path) => trainctl_core::load_config_file(path),
        None => trainctl_core::load_config(Some(&workspace)),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    commands::handle_command(cli.command, &config)
}
