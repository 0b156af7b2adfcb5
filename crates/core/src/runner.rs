#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! One profiler run, start to report.

use std::time::Duration;

use tracing::debug;

use crate::config::{ProfilerCommand, Timings};
use crate::error::RunError;
use crate::subordinate::{LaunchSpec, Launcher, SubordinateHandle};

/// Runs the profiler for a requested length and returns its report.
pub struct ProfilingRunner<L: Launcher> {
    launcher: L,
    command: ProfilerCommand,
    timings: Timings,
}

impl<L: Launcher> ProfilingRunner<L> {
    /// Create a new profiling runner
    #[must_use]
    pub const fn new(launcher: L, command: ProfilerCommand, timings: Timings) -> Self {
        Self {
            launcher,
            command,
            timings,
        }
    }

    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run the profiler for `run_length` against `project`.
    ///
    /// This will:
    /// 1. Launch the profiler with `--duration <run_length> --project <project>`
    /// 2. Wait out the run plus the output wait timeout
    /// 3. Send the stop token and collect the report
    ///
    /// The profiler process is gone when this returns, success or not.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The profiler cannot be launched
    /// - It exits before being asked to stop
    /// - It does not exit after being asked to stop
    /// - Its report is not valid UTF-8
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use std::time::Duration;
    /// # use profcap_core::{OsLauncher, ProfilerCommand, ProfilingRunner, RunError, Timings};
    /// # async fn example() -> Result<(), RunError> {
    /// let runner = ProfilingRunner::new(OsLauncher, ProfilerCommand::default(), Timings::default());
    /// let report = runner.run(Duration::from_secs(1800), "my-db", &[]).await?;
    /// println!("{report}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(
        &self,
        run_length: Duration,
        project: &str,
        extra_args: &[String],
    ) -> Result<String, RunError> {
        let spec = LaunchSpec::for_run(&self.command, run_length, project, extra_args);
        debug!(program = spec.program(), args = ?spec.args(), "launching profiler");

        let mut handle = SubordinateHandle::launch(&self.launcher, &spec, self.timings)?;
        let output = handle.run_to_completion(run_length).await?;

        debug!(
            stdout_bytes = output.stdout().len(),
            stderr_bytes = output.stderr().len(),
            "profiler finished"
        );
        output.into_stdout_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use crate::subordinate::testing::{FakeBehavior, FakeLauncher};

    fn runner(script: Vec<FakeBehavior>) -> ProfilingRunner<FakeLauncher> {
        ProfilingRunner::new(
            FakeLauncher::new(script, FakeBehavior::ignores_stop()),
            ProfilerCommand::default(),
            Timings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_run_returns_report() {
        let runner = runner(vec![
            FakeBehavior::well_behaved(Duration::from_secs(3)).with_stdout("slow query: /users"),
        ]);

        let report = runner
            .run(Duration::from_secs(1800), "my-db", &[])
            .await
            .unwrap();

        assert_eq!(report, "slow query: /users");
        let specs = runner.launcher().specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(
            specs[0].args(),
            ["database:profile", "--duration", "1800.0", "--project", "my-db"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_args_are_forwarded() {
        let runner = runner(vec![FakeBehavior::well_behaved(Duration::ZERO)]);

        runner
            .run(Duration::from_secs(90), "my-db", &["--raw".to_string()])
            .await
            .unwrap();

        let specs = runner.launcher().specs();
        assert_eq!(specs[0].args().last().map(String::as_str), Some("--raw"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_exit_surfaces_as_run_error() {
        let runner = runner(vec![
            FakeBehavior::exits_after(Duration::from_secs(1)).with_stderr("permission denied"),
        ]);

        let result = runner.run(Duration::from_secs(1800), "my-db", &[]).await;

        let err = result.unwrap_err();
        assert!(matches!(err, RunError::EarlyExit { .. }));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_profiler_is_dead_before_error_returns() {
        let runner = runner(vec![FakeBehavior::ignores_stop().ignores_terminate()]);

        let result = runner.run(Duration::from_secs(60), "my-db", &[]).await;

        assert!(matches!(result, Err(RunError::Unresponsive { .. })));
        assert!(runner.launcher().all_dead());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_is_a_run_error() {
        let runner = runner(vec![FakeBehavior::fails_to_launch()]);

        let result = runner.run(Duration::from_secs(60), "my-db", &[]).await;

        assert!(matches!(result, Err(RunError::LaunchFailed { .. })));
    }
}
