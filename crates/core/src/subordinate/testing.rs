//! Scripted fake subordinates for lifecycle tests.
//!
//! Behavior is expressed in tokio time, so tests run under
//! `#[tokio::test(start_paused = true)]` and a half hour run completes
//! instantly.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::arithmetic_side_effects)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep_until};

use super::{CapturedOutput, LaunchSpec, Launcher, Subordinate};
use crate::error::RunError;

/// How a fake profiler reacts to the world.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    natural_exit: Option<Duration>,
    stop_response: Option<Duration>,
    terminate_response: Option<Duration>,
    kill_delay: Duration,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    fail_stop_write: bool,
    fail_launch: bool,
    failing_kills: usize,
}

impl FakeBehavior {
    fn base() -> Self {
        Self {
            natural_exit: None,
            stop_response: None,
            terminate_response: Some(Duration::ZERO),
            kill_delay: Duration::ZERO,
            stdout: Vec::new(),
            stderr: Vec::new(),
            fail_stop_write: false,
            fail_launch: false,
            failing_kills: 0,
        }
    }

    /// Runs until told to stop, then exits after `delay`.
    pub fn well_behaved(delay: Duration) -> Self {
        Self {
            stop_response: Some(delay),
            ..Self::base()
        }
    }

    /// Exits on its own after `after`.
    pub fn exits_after(after: Duration) -> Self {
        Self {
            natural_exit: Some(after),
            stop_response: Some(Duration::ZERO),
            ..Self::base()
        }
    }

    /// Never reacts to the stop token.
    pub fn ignores_stop() -> Self {
        Self::base()
    }

    /// Cannot be started at all.
    pub fn fails_to_launch() -> Self {
        Self {
            fail_launch: true,
            ..Self::base()
        }
    }

    pub fn exits_on_terminate_after(mut self, delay: Duration) -> Self {
        self.terminate_response = Some(delay);
        self
    }

    pub fn ignores_terminate(mut self) -> Self {
        self.terminate_response = None;
        self
    }

    pub fn dies_after_kill(mut self, delay: Duration) -> Self {
        self.kill_delay = delay;
        self
    }

    /// The first `count` kill requests fail to be delivered.
    pub fn fails_kills(mut self, count: usize) -> Self {
        self.failing_kills = count;
        self
    }

    pub fn fails_stop_write(mut self) -> Self {
        self.fail_stop_write = true;
        self
    }

    pub fn with_stdout(mut self, text: &str) -> Self {
        self.stdout = text.as_bytes().to_vec();
        self
    }

    pub fn with_stderr(mut self, text: &str) -> Self {
        self.stderr = text.as_bytes().to_vec();
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    exit_at: Option<Instant>,
    stop_tokens: Vec<Vec<u8>>,
    terminations: usize,
    kills: usize,
    failed_kills: usize,
    polls: usize,
}

impl FakeState {
    fn schedule_exit(&mut self, at: Instant) {
        self.exit_at = Some(self.exit_at.map_or(at, |current| current.min(at)));
    }

    fn is_dead(&self) -> bool {
        self.exit_at.is_some_and(|at| at <= Instant::now())
    }
}

/// A fake profiler. Clones share state, so a clone kept by the test
/// observes what the handle did to the original.
#[derive(Debug, Clone)]
pub struct FakeSubordinate {
    behavior: Arc<FakeBehavior>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSubordinate {
    pub fn new(behavior: FakeBehavior) -> Self {
        let mut state = FakeState::default();
        if let Some(after) = behavior.natural_exit {
            state.schedule_exit(Instant::now() + after);
        }
        Self {
            behavior: Arc::new(behavior),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn probe(&self) -> Self {
        self.clone()
    }

    pub fn stop_tokens(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().stop_tokens.clone()
    }

    pub fn terminations(&self) -> usize {
        self.state.lock().unwrap().terminations
    }

    pub fn kills(&self) -> usize {
        self.state.lock().unwrap().kills
    }

    pub fn failed_kills(&self) -> usize {
        self.state.lock().unwrap().failed_kills
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    pub fn is_dead(&self) -> bool {
        self.state.lock().unwrap().is_dead()
    }
}

#[async_trait]
impl Subordinate for FakeSubordinate {
    fn id(&self) -> Option<u32> {
        (!self.is_dead()).then_some(4242)
    }

    async fn wait(&mut self) -> Result<(), RunError> {
        let exit_at = self.state.lock().unwrap().exit_at;
        match exit_at {
            Some(at) => sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
        Ok(())
    }

    fn try_wait(&mut self) -> Result<bool, RunError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        Ok(state.is_dead())
    }

    async fn send_stop(&mut self, token: &[u8]) -> Result<(), RunError> {
        if self.behavior.fail_stop_write {
            return Err(RunError::io(
                "stop signal",
                std::io::Error::other("stdin write failed"),
            ));
        }
        let mut state = self.state.lock().unwrap();
        state.stop_tokens.push(token.to_vec());
        if let Some(delay) = self.behavior.stop_response {
            state.schedule_exit(Instant::now() + delay);
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), RunError> {
        let mut state = self.state.lock().unwrap();
        state.terminations += 1;
        if let Some(delay) = self.behavior.terminate_response {
            state.schedule_exit(Instant::now() + delay);
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<(), RunError> {
        let mut state = self.state.lock().unwrap();
        if state.failed_kills < self.behavior.failing_kills {
            state.failed_kills += 1;
            return Err(RunError::io(
                "kill",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        state.kills += 1;
        let at = Instant::now() + self.behavior.kill_delay;
        state.schedule_exit(at);
        Ok(())
    }

    async fn collect_output(&mut self, _limit: Duration) -> CapturedOutput {
        CapturedOutput::new(self.behavior.stdout.clone(), self.behavior.stderr.clone())
    }
}

/// Hands out fakes in script order, then repeats the fallback.
pub struct FakeLauncher {
    script: Mutex<VecDeque<FakeBehavior>>,
    fallback: FakeBehavior,
    launched: Mutex<Vec<(LaunchSpec, FakeSubordinate)>>,
    overlaps: Mutex<usize>,
}

impl FakeLauncher {
    pub fn new(script: impl IntoIterator<Item = FakeBehavior>, fallback: FakeBehavior) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            launched: Mutex::new(Vec::new()),
            overlaps: Mutex::new(0),
        }
    }

    /// Specs of every launch, in order.
    pub fn specs(&self) -> Vec<LaunchSpec> {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .map(|(spec, _)| spec.clone())
            .collect()
    }

    /// Launches that happened while an earlier fake was still alive.
    pub fn overlaps(&self) -> usize {
        *self.overlaps.lock().unwrap()
    }

    pub fn all_dead(&self) -> bool {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .all(|(_, fake)| fake.is_dead())
    }
}

impl Launcher for FakeLauncher {
    type Process = FakeSubordinate;

    fn launch(&self, spec: &LaunchSpec) -> Result<FakeSubordinate, RunError> {
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if behavior.fail_launch {
            return Err(RunError::launch_failed(spec.program(), "command not found"));
        }

        if !self.all_dead() {
            *self.overlaps.lock().unwrap() += 1;
        }

        let fake = FakeSubordinate::new(behavior);
        self.launched
            .lock()
            .unwrap()
            .push((spec.clone(), fake.probe()));
        Ok(fake)
    }
}
