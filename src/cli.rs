//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;
use profcap_core::Overrides;

/// Continuously capture database profiler snapshots.
#[derive(Parser, Debug)]
#[command(name = "profcap")]
#[command(version)]
#[command(
    long_about = "Runs the database profiler for windows aligned to a wall-clock grid \
                  (every 30 minutes by default) and writes each report to its own file."
)]
pub struct Cli {
    /// Directory to write snapshots to [default: ~/<program>_logs]
    #[arg(long, value_name = "DIR")]
    pub output_folder: Option<PathBuf>,

    /// Database project to profile
    #[arg(long, value_name = "NAME")]
    pub project: Option<String>,

    /// Write raw JSON events instead of the aggregated report
    #[arg(long, default_value_t = false)]
    pub raw: bool,

    /// Profiler executable [default: firebase]
    #[arg(long, value_name = "PROGRAM")]
    pub profiler: Option<String>,

    /// Argument passed to the profiler before `--duration` (repeatable)
    /// [default: database:profile]
    #[arg(long = "profiler-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub profiler_args: Vec<String>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// The command line layer of the configuration.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            output_folder: self.output_folder.clone(),
            project: self.project.clone(),
            raw: self.raw,
            profiler_program: self.profiler.clone(),
            profiler_args: self.profiler_args.clone(),
        }
    }
}

/// Name used for the default output folder: the file stem of `argv[0]`.
#[must_use]
pub fn program_name(argv0: Option<&str>) -> String {
    argv0
        .map(std::path::Path::new)
        .and_then(std::path::Path::file_stem)
        .and_then(std::ffi::OsStr::to_str)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(env!("CARGO_PKG_NAME"))
        .to_string()
}
