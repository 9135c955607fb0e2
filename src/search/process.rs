//! Child process supervision.
//!
//! A [`Launcher`] turns an [`Invocation`] into a [`RunningProcess`]: a stream
//! of [`ProcessEvent`]s plus a [`ProcessHandle`] that is the only way to
//! terminate the child.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::search::SearchError;
use crate::search::args::Invocation;

/// Read buffer size for the child's pipes.
const READ_CHUNK: usize = 8 * 1024;

const INSTALL_HINT: &str = "\n\n\
    Install ripgrep:\n  \
    brew install ripgrep    # macOS\n  \
    cargo install ripgrep   # any platform\n  \
    apt install ripgrep     # Debian/Ubuntu";

/// How the child exited. `code` is `None` when it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

/// Something the child did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// Always the last event, sent after both pipes reached end of file.
    Exit(ExitInfo),
}

/// Kill switch for one child process.
///
/// Killing is idempotent and a no-op once the process has exited.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandle {
    kill: CancellationToken,
}

impl ProcessHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self) {
        self.kill.cancel();
    }

    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.kill.is_cancelled()
    }

    /// Resolves once [`kill`](Self::kill) has been called.
    pub async fn killed(&self) {
        self.kill.cancelled().await;
    }
}

/// A spawned child: its events and its kill switch.
#[derive(Debug)]
pub struct RunningProcess {
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    pub handle: ProcessHandle,
}

/// Starts search processes.
pub trait Launcher: Send + Sync {
    /// The executable invocations should name.
    fn program(&self) -> &Path;

    /// Spawn the child described by `invocation`.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Spawn` if the program cannot be started.
    fn launch(&self, invocation: &Invocation) -> Result<RunningProcess, SearchError>;
}

/// Launches a real ripgrep binary.
#[derive(Debug, Clone)]
pub struct RipgrepLauncher {
    pub binary: PathBuf,
}

impl RipgrepLauncher {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check that the binary runs.
    ///
    /// # Errors
    ///
    /// Returns an error with install instructions if ripgrep is not found.
    pub fn check_available(&self) -> anyhow::Result<()> {
        match std::process::Command::new(&self.binary)
            .arg("--version")
            .output()
        {
            Ok(output) if output.status.success() => Ok(()),
            _ => anyhow::bail!("ripgrep not found at {}{INSTALL_HINT}", self.binary.display()),
        }
    }
}

impl Default for RipgrepLauncher {
    fn default() -> Self {
        Self::new("rg")
    }
}

impl Launcher for RipgrepLauncher {
    fn program(&self) -> &Path {
        &self.binary
    }

    fn launch(&self, invocation: &Invocation) -> Result<RunningProcess, SearchError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SearchError::Spawn {
                program: invocation.program.display().to_string(),
                hint: if source.kind() == std::io::ErrorKind::NotFound {
                    INSTALL_HINT
                } else {
                    ""
                },
                source,
            })?;

        debug!(pid = ?child.id(), "spawned ripgrep");

        let (tx, events) = mpsc::unbounded_channel();
        let handle = ProcessHandle::new();

        let stdout = child.stdout.take().map(|pipe| {
            tokio::spawn(forward(pipe, tx.clone(), ProcessEvent::Stdout))
        });
        let stderr = child.stderr.take().map(|pipe| {
            tokio::spawn(forward(pipe, tx.clone(), ProcessEvent::Stderr))
        });

        let kill = handle.clone();
        tokio::spawn(async move {
            let exited = tokio::select! {
                biased;
                () = kill.killed() => None,
                status = child.wait() => Some(status),
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    if let Err(e) = child.start_kill() {
                        debug!("kill after exit: {e}");
                    }
                    child.wait().await
                }
            };

            for reader in [stdout, stderr].into_iter().flatten() {
                if let Err(e) = reader.await {
                    warn!("pipe reader failed: {e}");
                }
            }

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("waiting for ripgrep failed: {e}");
                    None
                }
            };
            let _ = tx.send(ProcessEvent::Exit(ExitInfo { code }));
        });

        Ok(RunningProcess { events, handle })
    }
}

async fn forward<R>(
    mut pipe: R,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(Vec<u8>) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("reading ripgrep output failed: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted stand-in for a ripgrep process.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// One step of a scripted run.
    #[derive(Debug, Clone)]
    pub enum Step {
        Stdout(Vec<u8>),
        Stderr(Vec<u8>),
        /// Wait until the test releases the gate (or the process is killed).
        Gate(Arc<tokio::sync::Notify>),
    }

    impl Step {
        pub fn out(bytes: impl AsRef<[u8]>) -> Self {
            Self::Stdout(bytes.as_ref().to_vec())
        }

        pub fn err(bytes: impl AsRef<[u8]>) -> Self {
            Self::Stderr(bytes.as_ref().to_vec())
        }
    }

    /// Replays `steps`, then exits with `code`. A kill stops the replay and
    /// exits with no code.
    #[derive(Debug, Clone)]
    pub struct FakeLauncher {
        steps: Vec<Step>,
        code: i32,
        pub launches: Arc<AtomicUsize>,
        pub handles: Arc<Mutex<Vec<ProcessHandle>>>,
        pub invocations: Arc<Mutex<Vec<Invocation>>>,
    }

    impl FakeLauncher {
        pub fn new(steps: Vec<Step>, code: i32) -> Self {
            Self {
                steps,
                code,
                launches: Arc::default(),
                handles: Arc::default(),
                invocations: Arc::default(),
            }
        }

        pub fn stdout<I, S>(chunks: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<[u8]>,
        {
            Self::new(chunks.into_iter().map(Step::out).collect(), 0)
        }

        pub fn launch_count(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        pub fn was_killed(&self) -> bool {
            self.handles.lock().iter().any(ProcessHandle::is_killed)
        }
    }

    impl Launcher for FakeLauncher {
        fn program(&self) -> &Path {
            Path::new("rg")
        }

        fn launch(&self, invocation: &Invocation) -> Result<RunningProcess, SearchError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            self.invocations.lock().push(invocation.clone());

            let (tx, events) = mpsc::unbounded_channel();
            let handle = ProcessHandle::new();
            self.handles.lock().push(handle.clone());

            let steps = self.steps.clone();
            let code = self.code;
            let kill = handle.clone();
            tokio::spawn(async move {
                for step in steps {
                    if kill.is_killed() {
                        break;
                    }
                    match step {
                        Step::Stdout(bytes) => {
                            let _ = tx.send(ProcessEvent::Stdout(bytes));
                        }
                        Step::Stderr(bytes) => {
                            let _ = tx.send(ProcessEvent::Stderr(bytes));
                        }
                        Step::Gate(gate) => {
                            tokio::select! {
                                () = gate.notified() => {}
                                () = kill.killed() => break,
                            }
                        }
                    }
                    tokio::task::yield_now().await;
                }
                let code = (!kill.is_killed()).then_some(code);
                let _ = tx.send(ProcessEvent::Exit(ExitInfo { code }));
            });

            Ok(RunningProcess { events, handle })
        }
    }

    /// Fails every launch as if the binary were missing.
    #[derive(Debug, Default)]
    pub struct MissingBinary;

    impl Launcher for MissingBinary {
        fn program(&self) -> &Path {
            Path::new("/nonexistent/rg")
        }

        fn launch(&self, invocation: &Invocation) -> Result<RunningProcess, SearchError> {
            Err(SearchError::Spawn {
                program: invocation.program.display().to_string(),
                hint: "",
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }
}
