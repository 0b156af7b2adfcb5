//! # profcap core
//!
//! Periodic profiler capture: run an external profiler for windows aligned to
//! a wall-clock grid, stop it through its stdin, keep its report.
//!
//! ## Components
//!
//! - [`schedule`]: grid-aligned run windows
//! - [`subordinate`]: one profiler process and its lifecycle
//! - [`runner`]: one capture, launch to report
//! - [`control`]: the capture loop
//!
//! ## Error Handling
//!
//! Nothing in here unwraps. Run-level failures are [`RunError`]s, and the
//! capture loop absorbs them. Only [`Error`] escapes the loop.

pub mod config;
pub mod control;
mod error;
pub mod naming;
pub mod runner;
pub mod schedule;
pub mod sink;
pub mod subordinate;

pub use config::{CaptureConfig, OutputFormat, Overrides, ProfilerCommand, Timings};
pub use control::{Clock, ControlLoop, CycleOutcome, SystemClock};
pub use error::{ConfigError, Error, Result, RunError};
pub use runner::ProfilingRunner;
pub use schedule::{GridPeriod, RunWindow};
pub use sink::{DirectorySink, SnapshotSink};
pub use subordinate::{CapturedOutput, LaunchSpec, Launcher, OsLauncher, Subordinate};
