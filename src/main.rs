//! lamco-selection-sync - X11 selection synchronization daemon
//!
//! Entry point for the daemon binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use lamco_selection_sync::config::Config;

/// Command-line arguments for lamco-selection-sync
#[derive(Parser, Debug)]
#[command(name = "lamco-selection-sync")]
#[command(version, about = "Keep X11 PRIMARY and CLIPBOARD in sync", long_about = None)]
pub struct Args {
    /// Configuration file path
    /// (default: $XDG_CONFIG_HOME/lamco-selection-sync/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sync mode (bidirectional|a-to-b|b-to-a)
    #[arg(short, long, env = "SELSYNC_MODE")]
    pub mode: Option<String>,

    /// X display to connect to
    #[arg(short, long, env = "DISPLAY")]
    pub display: Option<String>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let (config, config_error) = match args.config.clone().or_else(Config::default_path) {
        Some(path) => match Config::load(&path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default_config(), Some(e)),
        },
        None => (Config::default_config(), None),
    };

    // Override config with CLI args
    let config = config.with_overrides(args.mode.clone());

    // Initialize logging; the guard flushes the rolling file on exit
    let _log_guard = init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-selection-sync v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Some(e) = config_error {
        tracing::warn!("Failed to load config: {:#}, using defaults", e);
    }

    if let Err(e) = config.validate() {
        eprintln!("{}", lamco_selection_sync::utils::format_user_error(&e));
        return Err(e);
    }

    info!("Configuration loaded successfully");
    tracing::debug!("Config: {:?}", config);

    if let Err(e) = lamco_selection_sync::daemon::run(config, args.display.clone()).await {
        eprintln!("{}", lamco_selection_sync::utils::format_user_error(&e));
        return Err(e);
    }

    info!("Selection sync shut down");
    Ok(())
}

fn init_logging(args: &Args, config: &Config) -> Result<Option<WorkerGuard>> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_selection_sync={level},x11rb=warn,warn",
            level = log_level
        ))
    });

    let stdout_layer = match args.log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().boxed(),
        "compact" => tracing_subscriber::fmt::layer().compact().boxed(),
        _ => tracing_subscriber::fmt::layer().pretty().boxed(),
    };

    // If log file is specified, write to both stdout and file
    let file_layer = match &args.log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    // Daily rotated log directory from config
    let (dir_layer, guard) = match &config.logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lamco-selection-sync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(dir_layer)
        .init();

    if let Some(path) = &args.log_file {
        info!("Logging to file: {}", path);
    }
    if let Some(dir) = &config.logging.log_dir {
        info!("Logging to directory: {}", dir.display());
    }

    Ok(guard)
}
