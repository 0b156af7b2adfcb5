//! The capture loop.
//!
//! Scheduling → Capturing → Scheduling, forever. A failed capture costs its
//! window and nothing else: the error is logged and the next window is
//! scheduled straight away. Only a sink failure leaves the loop.

use std::convert::Infallible;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::{CaptureConfig, OutputFormat};
use crate::error::Result;
use crate::naming::{format_for_log, snapshot_file_name};
use crate::runner::ProfilingRunner;
use crate::schedule::{GridPeriod, RunWindow};
use crate::sink::SnapshotSink;
use crate::subordinate::Launcher;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What one pass of the loop achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The snapshot was written to `path`.
    Captured { window: RunWindow, path: PathBuf },
    /// The window was lost.
    Skipped { window: RunWindow, reason: String },
}

impl CycleOutcome {
    #[must_use]
    pub const fn window(&self) -> &RunWindow {
        match self {
            Self::Captured { window, .. } | Self::Skipped { window, .. } => window,
        }
    }
}

/// Drives the profiler window after window.
pub struct ControlLoop<L: Launcher, C: Clock, S: SnapshotSink> {
    runner: ProfilingRunner<L>,
    clock: C,
    sink: S,
    project: String,
    format: OutputFormat,
    grid_period: GridPeriod,
}

impl<L: Launcher, C: Clock, S: SnapshotSink> ControlLoop<L, C, S> {
    /// Build a loop for `config`, starting profilers through `launcher`.
    pub fn new(config: &CaptureConfig, launcher: L, clock: C, sink: S) -> Self {
        let timings = config.timings();
        Self {
            runner: ProfilingRunner::new(launcher, config.profiler().clone(), timings),
            clock,
            sink,
            project: config.project().to_string(),
            format: config.format(),
            grid_period: timings.grid_period(),
        }
    }

    #[must_use]
    pub const fn runner(&self) -> &ProfilingRunner<L> {
        &self.runner
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Capture window after window. Returns only if a snapshot cannot be
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails to write a captured snapshot.
    pub async fn run(&self) -> Result<Infallible> {
        loop {
            self.run_cycle().await?;
        }
    }

    /// Schedule one window, capture it, persist the report.
    ///
    /// Profiler failures are logged and reported as [`CycleOutcome::Skipped`].
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails to write a captured snapshot.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let window = RunWindow::starting_at(self.clock.now(), self.grid_period);
        info!(
            "Starting profile for {} - {}",
            format_for_log(window.start()),
            format_for_log(window.end())
        );

        let report = match self
            .runner
            .run(window.length(), &self.project, &self.format.profiler_args())
            .await
        {
            Ok(report) => report,
            Err(e) => {
                error!("{e}");
                return Ok(CycleOutcome::Skipped {
                    window,
                    reason: e.to_string(),
                });
            }
        };

        let file_name = snapshot_file_name(&self.project, window.start(), self.format.extension());
        let path = self.sink.persist(&file_name, &report).await?;
        info!("Wrote out {}", path.display());

        Ok(CycleOutcome::Captured { window, path })
    }
}
