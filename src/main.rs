//! # profcap - periodic profiler capture
//!
//! ## Startup Sequence
//!
//! 1. **CLI** - parse flags, install tracing
//! 2. **Configuration** - defaults, then the optional TOML file, then flags
//! 3. **Output directory** - created if missing; failure halts startup
//! 4. **Capture loop** - runs until killed or a snapshot cannot be written
//!
//! Profiler failures never stop the loop: each one costs a single window.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use profcap::cli::{self, Cli};
use profcap_core::config::{self as capture_config, FileConfig};
use profcap_core::{CaptureConfig, ControlLoop, DirectorySink, OsLauncher, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let argv0 = std::env::args().next();
    let config = load_config(&cli, &cli::program_name(argv0.as_deref()))?;

    let sink = DirectorySink::create(config.output_folder()).with_context(|| {
        format!(
            "Cannot use output folder {}",
            config.output_folder().display()
        )
    })?;

    info!(
        project = config.project(),
        output_folder = %sink.root().display(),
        format = ?config.format(),
        grid_period = ?config.timings().grid_period().as_duration(),
        "profcap starting"
    );

    let control = ControlLoop::new(&config, OsLauncher, SystemClock, sink);
    match control.run().await {
        Ok(never) => match never {},
        Err(e) => Err(e).context("Capture loop stopped"),
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Merge built-in defaults, the config file and the command line.
fn load_config(cli: &Cli, program_name: &str) -> Result<CaptureConfig> {
    let file = match &cli.config {
        Some(path) => capture_config::load_file_config(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => FileConfig::default(),
    };

    capture_config::resolve(file, cli.overrides(), program_name)
        .context("Invalid configuration")
}
