#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! OS-backed subordinate using `tokio::process`.
//!
//! Stdout and stderr are drained by background tasks from the moment of
//! launch, so a profiler that writes a lot while it runs never blocks on a
//! full pipe. Stdin is held apart from the `Child`: `Child::wait` would
//! otherwise close it, and an early EOF reads as a stop request to the
//! profiler.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CapturedOutput, LaunchSpec, Launcher, Subordinate};
use crate::error::RunError;

const READ_CHUNK: usize = 8 * 1024;

/// Launches real profiler processes.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use profcap_core::{LaunchSpec, Launcher, OsLauncher, ProfilerCommand, RunError, Subordinate};
/// # async fn example() -> Result<(), RunError> {
/// let spec = LaunchSpec::for_run(&ProfilerCommand::default(), Duration::from_secs(60), "my-db", &[]);
/// let mut profiler = OsLauncher.launch(&spec)?;
/// profiler.send_stop(b"\n").await?;
/// profiler.wait().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

impl Launcher for OsLauncher {
    type Process = OsSubordinate;

    fn launch(&self, spec: &LaunchSpec) -> Result<OsSubordinate, RunError> {
        let mut command = Command::new(spec.program());
        command
            .args(spec.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                RunError::launch_failed(spec.program(), "command not found")
            } else {
                RunError::launch_failed(spec.program(), e.to_string())
            }
        })?;

        let stdin = child.stdin.take();
        let stdout = PipeDrain::spawn(child.stdout.take());
        let stderr = PipeDrain::spawn(child.stderr.take());

        debug!(pid = ?child.id(), program = spec.program(), "profiler launched");

        Ok(OsSubordinate {
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

/// A profiler child process with piped stdio.
pub struct OsSubordinate {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: PipeDrain,
    stderr: PipeDrain,
}

#[async_trait]
impl Subordinate for OsSubordinate {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<(), RunError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| RunError::io("wait", e))?;
        debug!(%status, "profiler exited");
        Ok(())
    }

    fn try_wait(&mut self) -> Result<bool, RunError> {
        self.child
            .try_wait()
            .map(|status| status.is_some())
            .map_err(|e| RunError::io("status poll", e))
    }

    async fn send_stop(&mut self, token: &[u8]) -> Result<(), RunError> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };

        let written = match stdin.write_all(token).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        // Dropping the handle closes our end of the pipe.
        drop(stdin);

        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("profiler stdin already closed");
                Ok(())
            }
            Err(e) => Err(RunError::io("stop signal", e)),
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<(), RunError> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|e| {
            RunError::io("terminate", std::io::Error::new(ErrorKind::InvalidInput, e))
        })?;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|errno| RunError::io("terminate", std::io::Error::from(errno)))
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<(), RunError> {
        // No polite termination request off Unix.
        self.kill()
    }

    fn kill(&mut self) -> Result<(), RunError> {
        self.child
            .start_kill()
            .map_err(|e| RunError::io("kill", e))
    }

    async fn collect_output(&mut self, limit: Duration) -> CapturedOutput {
        let (stdout, stderr) = tokio::join!(self.stdout.finish(limit), self.stderr.finish(limit));
        CapturedOutput::new(stdout, stderr)
    }
}

/// Background reader accumulating one output pipe.
struct PipeDrain {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl PipeDrain {
    fn spawn<R>(source: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = source.map(|stream| tokio::spawn(drain(stream, Arc::clone(&buffer))));
        Self { buffer, task }
    }

    /// Wait up to `limit` for EOF, then hand out what was read.
    async fn finish(&mut self, limit: Duration) -> Vec<u8> {
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(limit, task).await.is_err() {
                abort.abort();
                warn!("profiler output pipe still open after exit, keeping partial output");
            }
        }
        std::mem::take(&mut *self.buffer.lock().await)
    }
}

impl Drop for PipeDrain {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn drain<R>(mut stream: R, buffer: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0_u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => {
                if let Some(bytes) = chunk.get(..read) {
                    buffer.lock().await.extend_from_slice(bytes);
                }
            }
            Err(e) => {
                debug!(error = %e, "profiler output read failed");
                break;
            }
        }
    }
}
