//! The profiler as a subordinate process.
//!
//! [`Subordinate`] is one running profiler, [`Launcher`] starts them. The OS
//! implementation lives in [`process`]; [`handle`] drives a subordinate
//! through its lifecycle and owns the termination policy.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ProfilerCommand;
use crate::error::RunError;

pub mod handle;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

pub use handle::{Phase, SubordinateHandle, Termination};
pub use process::{OsLauncher, OsSubordinate};

/// Written to the profiler's stdin to make it stop and print its report.
pub const STOP_TOKEN: &[u8] = b"\n";

/// Bytes a subordinate wrote to its stdout and stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl CapturedOutput {
    #[must_use]
    pub const fn new(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self { stdout, stderr }
    }

    #[must_use]
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    #[must_use]
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Stdout for diagnostics, invalid UTF-8 replaced.
    #[must_use]
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Stderr for diagnostics, invalid UTF-8 replaced.
    #[must_use]
    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Decode stdout as the snapshot text.
    ///
    /// # Errors
    ///
    /// Returns error if stdout is not valid UTF-8.
    pub fn into_stdout_string(self) -> Result<String, RunError> {
        String::from_utf8(self.stdout).map_err(|e| RunError::InvalidOutput {
            reason: e.to_string(),
        })
    }
}

/// Full invocation of one profiler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: String,
    args: Vec<String>,
}

impl LaunchSpec {
    /// `<program> <leading args> --duration <secs> --project <project> <extra args>`
    #[must_use]
    pub fn for_run(
        command: &ProfilerCommand,
        run_length: Duration,
        project: &str,
        extra_args: &[String],
    ) -> Self {
        let args = command
            .args()
            .iter()
            .cloned()
            .chain([
                "--duration".to_string(),
                render_seconds(run_length),
                "--project".to_string(),
                project.to_string(),
            ])
            .chain(extra_args.iter().cloned())
            .collect();

        Self {
            program: command.program().to_string(),
            args,
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

/// Seconds with a fractional part: `1800.0`, `12.5`.
fn render_seconds(value: Duration) -> String {
    format!("{:?}", value.as_secs_f64())
}

/// One running profiler.
///
/// Implementations must be cancel safe in [`Subordinate::wait`]: the handle
/// races it against timeouts.
#[async_trait]
pub trait Subordinate: Send {
    /// OS process id, if the process has not been reaped yet.
    fn id(&self) -> Option<u32>;

    /// Wait until the process has exited.
    async fn wait(&mut self) -> Result<(), RunError>;

    /// Non-blocking exit check. `true` once the process is gone.
    fn try_wait(&mut self) -> Result<bool, RunError>;

    /// Write `token` to stdin and close it.
    async fn send_stop(&mut self, token: &[u8]) -> Result<(), RunError>;

    /// Ask the process to exit (SIGTERM).
    fn terminate(&mut self) -> Result<(), RunError>;

    /// Force the process to exit (SIGKILL).
    fn kill(&mut self) -> Result<(), RunError>;

    /// Everything written to stdout/stderr so far, waiting at most `limit`
    /// for the pipes to close.
    async fn collect_output(&mut self, limit: Duration) -> CapturedOutput;
}

/// Starts subordinates.
pub trait Launcher: Send + Sync {
    type Process: Subordinate;

    /// Start the profiler described by `spec` with piped stdio.
    ///
    /// # Errors
    ///
    /// Returns error if the process cannot be started.
    fn launch(&self, spec: &LaunchSpec) -> Result<Self::Process, RunError>;
}
