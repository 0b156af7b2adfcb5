//! Capture configuration
//!
//! # Hierarchy
//!
//! Configuration is resolved in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config`)
//! 3. CLI flags
//!
//! # Example Config
//!
//! ```toml
//! output_folder = "/var/log/profcap"
//! project = "my-db"
//! raw = true
//!
//! [profiler]
//! program = "firebase"
//! args = ["database:profile"]
//!
//! [timings]
//! grid_period_secs = 1800
//! output_wait_timeout_secs = 30
//! grace_period_ms = 5000
//! poll_interval_ms = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::schedule::GridPeriod;

/// Extra time granted after the requested run length, and after the stop token.
pub const DEFAULT_OUTPUT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a terminated profiler gets to exit before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How often exit is polled while terminating a profiler.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default profiler executable.
pub const DEFAULT_PROFILER_PROGRAM: &str = "firebase";

/// Default leading profiler arguments.
pub const DEFAULT_PROFILER_ARGS: &[&str] = &["database:profile"];

// ═══════════════════════════════════════════════════════════════════════════
// TIMINGS
// ═══════════════════════════════════════════════════════════════════════════

/// Every timing knob of the capture lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    grid_period: GridPeriod,
    output_wait_timeout: Duration,
    grace_period: Duration,
    poll_interval: Duration,
}

impl Timings {
    /// Create validated timings.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The grid period is not a divisor of 24 hours
    /// - The output wait timeout or poll interval is zero
    pub fn new(
        grid_period: Duration,
        output_wait_timeout: Duration,
        grace_period: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let grid_period = GridPeriod::new(grid_period)?;
        if output_wait_timeout.is_zero() {
            return Err(ConfigError::InvalidTiming {
                name: "output_wait_timeout",
                reason: "must be greater than 0".to_string(),
            });
        }
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidTiming {
                name: "poll_interval",
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            grid_period,
            output_wait_timeout,
            grace_period,
            poll_interval,
        })
    }

    #[must_use]
    pub const fn grid_period(&self) -> GridPeriod {
        self.grid_period
    }

    #[must_use]
    pub const fn output_wait_timeout(&self) -> Duration {
        self.output_wait_timeout
    }

    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        self.grace_period
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            grid_period: GridPeriod::default(),
            output_wait_timeout: DEFAULT_OUTPUT_WAIT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILER INVOCATION
// ═══════════════════════════════════════════════════════════════════════════

/// Output flavour requested from the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aggregated, human readable report.
    #[default]
    Text,
    /// Raw JSON profiling events.
    Raw,
}

impl OutputFormat {
    /// Snapshot file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Raw => "json",
        }
    }

    /// Flags appended to the profiler invocation.
    #[must_use]
    pub fn profiler_args(self) -> Vec<String> {
        match self {
            Self::Text => Vec::new(),
            Self::Raw => vec!["--raw".to_string()],
        }
    }
}

/// Program and leading arguments used to start the profiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerCommand {
    program: String,
    args: Vec<String>,
}

impl ProfilerCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Default for ProfilerCommand {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILER_PROGRAM, DEFAULT_PROFILER_ARGS.iter().copied())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CAPTURE CONFIG
// ═══════════════════════════════════════════════════════════════════════════

/// Fully resolved configuration of a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    output_folder: PathBuf,
    project: String,
    format: OutputFormat,
    profiler: ProfilerCommand,
    timings: Timings,
}

impl CaptureConfig {
    /// Create a configuration with default profiler, format and timings.
    ///
    /// # Errors
    ///
    /// Returns error if the project name is empty or the output folder path
    /// is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// # use profcap_core::CaptureConfig;
    /// # use std::path::PathBuf;
    /// let config = CaptureConfig::new(PathBuf::from("/tmp/snapshots"), "my-db");
    /// assert!(config.is_ok());
    /// ```
    pub fn new(output_folder: PathBuf, project: impl Into<String>) -> Result<Self, ConfigError> {
        let project = project.into();
        if project.trim().is_empty() {
            return Err(ConfigError::MissingProject);
        }
        if output_folder.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputFolder);
        }

        Ok(Self {
            output_folder,
            project,
            format: OutputFormat::default(),
            profiler: ProfilerCommand::default(),
            timings: Timings::default(),
        })
    }

    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_profiler(mut self, profiler: ProfilerCommand) -> Self {
        self.profiler = profiler;
        self
    }

    #[must_use]
    pub const fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    #[must_use]
    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    #[must_use]
    pub const fn profiler(&self) -> &ProfilerCommand {
        &self.profiler
    }

    #[must_use]
    pub const fn timings(&self) -> Timings {
        self.timings
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LAYERS
// ═══════════════════════════════════════════════════════════════════════════

/// Contents of an optional TOML configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub output_folder: Option<PathBuf>,
    pub project: Option<String>,
    pub raw: Option<bool>,
    pub profiler: ProfilerSection,
    pub timings: TimingsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilerSection {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingsSection {
    pub grid_period_secs: Option<u64>,
    pub output_wait_timeout_secs: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

impl TimingsSection {
    fn resolve(&self) -> Result<Timings, ConfigError> {
        let defaults = Timings::default();
        Timings::new(
            self.grid_period_secs
                .map_or(defaults.grid_period().as_duration(), Duration::from_secs),
            self.output_wait_timeout_secs
                .map_or(defaults.output_wait_timeout(), Duration::from_secs),
            self.grace_period_ms
                .map_or(defaults.grace_period(), Duration::from_millis),
            self.poll_interval_ms
                .map_or(defaults.poll_interval(), Duration::from_millis),
        )
    }
}

/// Values given on the command line. `None` / empty means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub output_folder: Option<PathBuf>,
    pub project: Option<String>,
    pub raw: bool,
    pub profiler_program: Option<String>,
    pub profiler_args: Vec<String>,
}

/// Load a TOML configuration file.
///
/// # Errors
///
/// Returns error if:
/// - File cannot be read
/// - TOML is malformed or has unknown keys
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigFileRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::ConfigFileParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// `~/<program_name>_logs`
///
/// # Errors
///
/// Returns error if no home directory can be determined.
pub fn default_output_folder(program_name: &str) -> Result<PathBuf, ConfigError> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(format!("{program_name}_logs")))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// Merge defaults, file and command line into a validated configuration.
///
/// # Errors
///
/// Returns error if:
/// - No project is given in either layer
/// - Timings fail validation
/// - The default output folder is needed but there is no home directory
pub fn resolve(
    file: FileConfig,
    overrides: Overrides,
    program_name: &str,
) -> Result<CaptureConfig, ConfigError> {
    let project = overrides
        .project
        .or(file.project)
        .ok_or(ConfigError::MissingProject)?;

    let output_folder = match overrides.output_folder.or(file.output_folder) {
        Some(folder) => folder,
        None => default_output_folder(program_name)?,
    };

    let format = if overrides.raw || file.raw.unwrap_or(false) {
        OutputFormat::Raw
    } else {
        OutputFormat::Text
    };

    let program = overrides
        .profiler_program
        .or(file.profiler.program)
        .unwrap_or_else(|| DEFAULT_PROFILER_PROGRAM.to_string());
    let args = if overrides.profiler_args.is_empty() {
        file.profiler.args.unwrap_or_else(|| {
            DEFAULT_PROFILER_ARGS
                .iter()
                .map(ToString::to_string)
                .collect()
        })
    } else {
        overrides.profiler_args
    };

    let timings = file.timings.resolve()?;

    Ok(CaptureConfig::new(output_folder, project)?
        .with_format(format)
        .with_profiler(ProfilerCommand::new(program, args))
        .with_timings(timings))
}
