#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Lifecycle of one profiler run.
//!
//! ```text
//! Launched ──(run length + output wait elapses)──▶ AwaitingStop
//!    │                                                  │ stop token
//!    │ exits on its own: early exit error               ▼
//!    └──────────────────────────▶ Exited ◀──────── Stopping
//!                                   ▲                   │ no exit in time
//!                                   └── end_process ◀───┘
//! ```
//!
//! Every path out of [`SubordinateHandle::run_to_completion`] leaves the
//! process in `Exited`: the next cycle never overlaps a live profiler.

use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use super::{CapturedOutput, LaunchSpec, Launcher, STOP_TOKEN, Subordinate};
use crate::config::Timings;
use crate::error::RunError;

/// Where a subordinate is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Started, running its requested duration.
    Launched,
    /// Run length elapsed, waiting for the stop token.
    AwaitingStop,
    /// Stop token sent, waiting for the report and exit.
    Stopping,
    /// Gone and reaped.
    Exited,
}

/// How [`SubordinateHandle::end_process`] got the process to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// It was already gone.
    AlreadyExited,
    /// It exited within the grace period after SIGTERM.
    Graceful,
    /// It had to be killed.
    Killed,
}

/// Exclusive owner of one subordinate.
pub struct SubordinateHandle<P: Subordinate> {
    process: P,
    phase: Phase,
    timings: Timings,
}

impl<P: Subordinate> SubordinateHandle<P> {
    /// Launch a subordinate.
    ///
    /// # Errors
    ///
    /// Returns error if the launcher cannot start the process.
    pub fn launch<L>(launcher: &L, spec: &LaunchSpec, timings: Timings) -> Result<Self, RunError>
    where
        L: Launcher<Process = P>,
    {
        let process = launcher.launch(spec)?;
        Ok(Self::new(process, timings))
    }

    /// Take ownership of an already running subordinate.
    #[must_use]
    pub const fn new(process: P, timings: Timings) -> Self {
        Self {
            process,
            phase: Phase::Launched,
            timings,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the whole lifecycle: await the run, send the stop token,
    /// collect the report.
    ///
    /// Whatever happens, the process has exited when this returns.
    ///
    /// # Errors
    ///
    /// Returns error if the profiler exits before being asked to stop, does
    /// not exit after being asked to stop, or cannot be talked to.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use std::time::Duration;
    /// # use profcap_core::{LaunchSpec, OsLauncher, ProfilerCommand, RunError, Timings};
    /// # use profcap_core::subordinate::SubordinateHandle;
    /// # async fn example() -> Result<(), RunError> {
    /// let run_length = Duration::from_secs(60);
    /// let spec = LaunchSpec::for_run(&ProfilerCommand::default(), run_length, "my-db", &[]);
    /// let mut handle = SubordinateHandle::launch(&OsLauncher, &spec, Timings::default())?;
    /// let output = handle.run_to_completion(run_length).await?;
    /// println!("{}", output.stdout_text());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_to_completion(&mut self, run_length: Duration) -> Result<CapturedOutput, RunError> {
        let result = match self.await_run_completion(run_length).await {
            Ok(()) => self.stop_and_collect().await,
            Err(e) => Err(e),
        };

        if result.is_err() && self.phase != Phase::Exited {
            if let Err(e) = self.end_process().await {
                warn!(pid = ?self.process.id(), error = %e, "failed to end profiler after error");
            }
        }
        result
    }

    /// Wait out the requested run plus the output wait timeout.
    ///
    /// The profiler is expected to still be alive afterwards, waiting for the
    /// stop token. Exiting at any point before that is an early exit.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::EarlyExit`] with the captured output if the
    /// process is gone when the wait ends.
    pub async fn await_run_completion(&mut self, run_length: Duration) -> Result<(), RunError> {
        let deadline = run_length.saturating_add(self.timings.output_wait_timeout());
        debug!(pid = ?self.process.id(), ?deadline, "awaiting profiler run");

        let exited = match timeout(deadline, self.process.wait()).await {
            Ok(waited) => {
                waited?;
                true
            }
            Err(_) => self.process.try_wait()?,
        };

        if exited {
            self.phase = Phase::Exited;
            let output = self
                .process
                .collect_output(self.timings.output_wait_timeout())
                .await;
            return Err(RunError::EarlyExit { output });
        }

        self.phase = Phase::AwaitingStop;
        Ok(())
    }

    /// Send the stop token and wait for the profiler to exit with its report.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Unresponsive`] if the process does not exit within
    /// the output wait timeout. It has been terminated by then.
    pub async fn stop_and_collect(&mut self) -> Result<CapturedOutput, RunError> {
        let limit = self.timings.output_wait_timeout();
        self.phase = Phase::Stopping;
        debug!(pid = ?self.process.id(), "sending stop token");
        self.process.send_stop(STOP_TOKEN).await?;

        if let Ok(waited) = timeout(limit, self.process.wait()).await {
            waited?;
            self.phase = Phase::Exited;
            return Ok(self.process.collect_output(limit).await);
        }

        warn!(pid = ?self.process.id(), ?limit, "profiler did not exit after stop token");
        self.end_process().await?;
        let output = self.process.collect_output(limit).await;
        Err(RunError::Unresponsive { output })
    }

    /// SIGTERM, poll for the grace period, then SIGKILL and poll until gone.
    ///
    /// Never returns `Ok` while the process is alive, and never polls faster
    /// than the poll interval. A kill that cannot be delivered is retried at
    /// the poll interval until the process is gone.
    ///
    /// # Errors
    ///
    /// Returns error if the exit status cannot be polled.
    pub async fn end_process(&mut self) -> Result<Termination, RunError> {
        if self.phase == Phase::Exited || self.process.try_wait()? {
            self.phase = Phase::Exited;
            return Ok(Termination::AlreadyExited);
        }

        let pid = self.process.id();
        let poll = self.timings.poll_interval();
        let grace_deadline = Instant::now()
            .checked_add(self.timings.grace_period())
            .unwrap_or_else(Instant::now);

        if let Err(e) = self.process.terminate() {
            warn!(?pid, error = %e, "termination request failed");
        }

        loop {
            if self.process.try_wait()? {
                self.phase = Phase::Exited;
                info!(?pid, "profiler exited after termination request");
                return Ok(Termination::Graceful);
            }
            if Instant::now() >= grace_deadline {
                break;
            }
            sleep(poll).await;
        }

        warn!(?pid, grace = ?self.timings.grace_period(), "profiler ignored termination request, killing");
        let mut killed = self.send_kill(pid);
        while !self.process.try_wait()? {
            sleep(poll).await;
            if !killed {
                killed = self.send_kill(pid);
            }
        }
        self.phase = Phase::Exited;
        info!(?pid, "profiler killed");
        Ok(Termination::Killed)
    }

    /// Whether the kill signal went out. Failed deliveries are logged.
    fn send_kill(&mut self, pid: Option<u32>) -> bool {
        match self.process.kill() {
            Ok(()) => true,
            Err(e) => {
                warn!(?pid, error = %e, "kill request failed, retrying");
                false
            }
        }
    }
}
