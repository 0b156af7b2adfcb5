//! Error types for profcap.
//!
//! Three layers, all explicit and typed:
//! - [`ConfigError`]: invalid configuration, detected before the loop starts.
//! - [`RunError`]: one capture cycle failed; the control loop logs it and moves on.
//! - [`Error`]: everything that may stop the process (config, output directory I/O).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::subordinate::CapturedOutput;

/// Configuration errors. Never recovered from.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid period must be greater than zero")]
    ZeroGridPeriod,

    #[error("grid period {period:?} exceeds 24 hours")]
    GridPeriodTooLong { period: Duration },

    #[error("grid period {period:?} does not evenly divide 24 hours")]
    GridPeriodNotDivisor { period: Duration },

    #[error("invalid timing '{name}': {reason}")]
    InvalidTiming { name: &'static str, reason: String },

    #[error("no project given; pass --project or set `project` in the config file")]
    MissingProject,

    #[error("output folder cannot be empty")]
    EmptyOutputFolder,

    #[error("no home directory available to derive the default output folder")]
    NoHomeDirectory,

    #[error("failed to read config file '{path}': {reason}")]
    ConfigFileRead { path: PathBuf, reason: String },

    #[error("failed to parse config file '{path}': {reason}")]
    ConfigFileParse { path: PathBuf, reason: String },
}

/// A single capture cycle failed. The window is lost, the loop continues.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch profiler '{program}': {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error(
        "profiler process terminated early.\n stdout: {}\n stderr: {}",
        output.stdout_text(),
        output.stderr_text()
    )]
    EarlyExit { output: CapturedOutput },

    #[error(
        "profiler process failed to terminate.\n stdout: {}\n stderr: {}",
        output.stdout_text(),
        output.stderr_text()
    )]
    Unresponsive { output: CapturedOutput },

    #[error("profiler output is not valid UTF-8: {reason}")]
    InvalidOutput { reason: String },

    #[error("profiler {operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Create a launch error.
    pub fn launch_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error raised while talking to the subordinate.
    #[must_use]
    pub const fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// Output captured from the subordinate before the failure, if any.
    #[must_use]
    pub const fn captured_output(&self) -> Option<&CapturedOutput> {
        match self {
            Self::EarlyExit { output } | Self::Unresponsive { output } => Some(output),
            Self::LaunchFailed { .. } | Self::InvalidOutput { .. } | Self::Io { .. } => None,
        }
    }
}

/// Errors that stop profcap.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create directory '{path}': {reason}")]
    DirectoryCreationFailed { path: PathBuf, reason: String },

    #[error("failed to write file '{path}': {reason}")]
    FileWriteFailed { path: PathBuf, reason: String },
}

impl Error {
    /// Create a directory creation error.
    pub fn directory_creation_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DirectoryCreationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a file write error.
    pub fn file_write_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for fallible profcap operations.
pub type Result<T> = std::result::Result<T, Error>;
