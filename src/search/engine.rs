//! The run loop shared by file and text search.
//!
//! One call walks `Idle -> Spawned -> Streaming -> Closed`. Cancellation
//! before the spawn skips it; cancellation while streaming kills the child,
//! drops any further output and settles once the child has exited.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::search::args::Invocation;
use crate::search::classify::{Classification, classify};
use crate::search::decoder::LineDecoder;
use crate::search::process::{ExitInfo, Launcher, ProcessEvent, ProcessHandle, RunningProcess};
use crate::search::{SearchComplete, SearchError};

/// Whether the line consumer wants more lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The result limit was reached. The child is killed and the run
    /// completes with `limit_hit`.
    Stop,
}

/// Kills the child if the run ends early, including when the future is dropped.
struct KillGuard(ProcessHandle);

impl Drop for KillGuard {
    fn drop(&mut self) {
        self.0.kill();
    }
}

#[derive(Debug, Default)]
struct Delivery {
    stopped: bool,
    cancelled: bool,
}

impl Delivery {
    fn done(&self) -> bool {
        self.stopped || self.cancelled
    }

    /// Hand `lines` to the consumer in order, rechecking cancellation before
    /// each one.
    fn deliver<F>(
        &mut self,
        lines: Vec<String>,
        cancel: &CancellationToken,
        handle: &ProcessHandle,
        on_line: &mut F,
    ) -> Result<(), SearchError>
    where
        F: FnMut(String) -> Result<Flow, SearchError>,
    {
        for line in lines {
            if cancel.is_cancelled() {
                self.cancelled = true;
                handle.kill();
                break;
            }
            if on_line(line)? == Flow::Stop {
                self.stopped = true;
                handle.kill();
                break;
            }
        }
        Ok(())
    }
}

/// Run `invocation` to completion, feeding each decoded stdout line to
/// `on_line` in the order ripgrep printed them.
///
/// # Errors
///
/// Returns `SearchError::Cancelled` if `cancel` fires before the child
/// exits, `SearchError::Spawn` if it cannot be started,
/// `SearchError::MalformedStream` on a decoding invariant violation, or
/// `SearchError::Tool` when ripgrep failed without producing output.
pub async fn run<L, F>(
    launcher: &L,
    invocation: &Invocation,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Result<SearchComplete, SearchError>
where
    L: Launcher + ?Sized,
    F: FnMut(String) -> Result<Flow, SearchError>,
{
    info!("{}", invocation.display());

    if cancel.is_cancelled() {
        debug!("search cancelled before spawn");
        return Err(SearchError::Cancelled);
    }

    let RunningProcess { mut events, handle } = launcher.launch(invocation)?;
    let _guard = KillGuard(handle.clone());

    let mut decoder = LineDecoder::new();
    let mut delivery = Delivery::default();
    let mut saw_stdout = false;
    let mut stderr = Vec::new();

    let exit = loop {
        let event = if delivery.done() {
            events.recv().await
        } else {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    delivery.cancelled = true;
                    handle.kill();
                    continue;
                }
                event = events.recv() => event,
            }
        };

        match event {
            Some(ProcessEvent::Stdout(bytes)) => {
                saw_stdout |= !bytes.is_empty();
                if !delivery.done() {
                    let lines = decoder.push(&bytes)?;
                    delivery.deliver(lines, cancel, &handle, &mut on_line)?;
                }
            }
            Some(ProcessEvent::Stderr(bytes)) => stderr.extend_from_slice(&bytes),
            Some(ProcessEvent::Exit(exit)) => break exit,
            // Supervisor went away without reporting an exit.
            None => break ExitInfo { code: None },
        }
    };

    let stderr = String::from_utf8_lossy(&stderr);
    if !stderr.trim().is_empty() {
        debug!(code = ?exit.code, "ripgrep stderr:\n{stderr}");
    }

    if !delivery.done() {
        let lines = decoder.flush(true)?;
        delivery.deliver(lines, cancel, &handle, &mut on_line)?;
    }

    if delivery.cancelled {
        debug!("search cancelled");
        return Err(SearchError::Cancelled);
    }
    if delivery.stopped {
        return Ok(SearchComplete { limit_hit: true });
    }

    match classify(&exit, saw_stdout, &stderr) {
        Classification::Completed | Classification::NoMatches => {
            Ok(SearchComplete { limit_hit: false })
        }
        Classification::Failed { reason } => Err(SearchError::Tool {
            code: exit.code,
            reason: format!(
                "ripgrep failed with exit code {}: {reason}",
                exit.code.map_or_else(|| "none".to_string(), |c| c.to_string())
            ),
            stderr: stderr.into_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::search::process::fake::{FakeLauncher, MissingBinary, Step};

    fn invocation() -> Invocation {
        Invocation {
            program: PathBuf::from("rg"),
            args: vec!["--files".into()],
            cwd: PathBuf::from("/work"),
        }
    }

    async fn collect(
        launcher: &FakeLauncher,
        cancel: &CancellationToken,
    ) -> (Vec<String>, Result<SearchComplete, SearchError>) {
        let mut lines = Vec::new();
        let outcome = run(launcher, &invocation(), cancel, |line| {
            lines.push(line);
            Ok(Flow::Continue)
        })
        .await;
        (lines, outcome)
    }

    #[tokio::test]
    async fn delivers_lines_across_chunks() {
        let launcher = FakeLauncher::stdout(["a.ts\nc.", "ts\nd", ".ts"]);
        let (lines, outcome) = collect(&launcher, &CancellationToken::new()).await;

        assert_eq!(lines, vec!["a.ts", "c.ts", "d.ts"]);
        assert_eq!(outcome.unwrap(), SearchComplete { limit_hit: false });
    }

    #[tokio::test]
    async fn exit_one_without_output_is_empty_success() {
        let launcher = FakeLauncher::new(vec![], 1);
        let (lines, outcome) = collect(&launcher, &CancellationToken::new()).await;

        assert!(lines.is_empty());
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn stderr_with_output_is_still_success() {
        let launcher = FakeLauncher::new(
            vec![
                Step::out("a.ts\n"),
                Step::err("rg: ./locked: Permission denied (os error 13)\n"),
            ],
            2,
        );
        let (lines, outcome) = collect(&launcher, &CancellationToken::new()).await;

        assert_eq!(lines, vec!["a.ts"]);
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn regex_error_fails_without_results() {
        let launcher = FakeLauncher::new(
            vec![Step::err(
                "rg: regex parse error:\n    (\n    ^\nerror: unclosed group\n",
            )],
            2,
        );
        let (lines, outcome) = collect(&launcher, &CancellationToken::new()).await;

        assert!(lines.is_empty());
        match outcome {
            Err(SearchError::Tool {
                code,
                reason,
                stderr,
            }) => {
                assert_eq!(code, Some(2));
                assert!(reason.contains("Regex parse error"), "{reason}");
                assert!(stderr.contains("unclosed group"));
            }
            other => panic!("expected tool failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_before_spawn_skips_launch() {
        let launcher = FakeLauncher::stdout(["a\n"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (lines, outcome) = collect(&launcher, &cancel).await;

        assert!(lines.is_empty());
        assert!(matches!(outcome, Err(SearchError::Cancelled)));
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn cancel_mid_chunk_keeps_delivered_lines() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(
            vec![
                Step::out("one\ntwo\nthree\nfour\n"),
                Step::Gate(gate),
                Step::out("five\n"),
            ],
            0,
        );
        let cancel = CancellationToken::new();

        let mut lines = Vec::new();
        let outcome = run(&launcher, &invocation(), &cancel, |line| {
            lines.push(line);
            if lines.len() == 2 {
                cancel.cancel();
            }
            Ok(Flow::Continue)
        })
        .await;

        assert_eq!(lines, vec!["one", "two"]);
        assert!(matches!(outcome, Err(SearchError::Cancelled)));
        assert!(launcher.was_killed());
    }

    #[tokio::test]
    async fn cancel_while_waiting_kills_child() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(
            vec![Step::out("one\n"), Step::Gate(gate), Step::out("two\n")],
            0,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let mut lines = Vec::new();
        let outcome = run(&launcher, &invocation(), &cancel, |line| {
            lines.push(line);
            trigger.cancel();
            Ok(Flow::Continue)
        })
        .await;

        assert_eq!(lines, vec!["one"]);
        assert!(matches!(outcome, Err(SearchError::Cancelled)));
        assert!(launcher.was_killed());
    }

    #[tokio::test]
    async fn cancel_after_completion_is_ignored() {
        let launcher = FakeLauncher::stdout(["a\n"]);
        let cancel = CancellationToken::new();

        let (lines, outcome) = collect(&launcher, &cancel).await;
        cancel.cancel();

        assert_eq!(lines, vec!["a"]);
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn stop_kills_and_reports_limit_hit() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(
            vec![Step::out("a\nb\nc\n"), Step::Gate(gate), Step::out("d\n")],
            0,
        );

        let mut lines = Vec::new();
        let outcome = run(&launcher, &invocation(), &CancellationToken::new(), |line| {
            lines.push(line);
            Ok(if lines.len() == 2 {
                Flow::Stop
            } else {
                Flow::Continue
            })
        })
        .await;

        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(outcome.unwrap(), SearchComplete { limit_hit: true });
        assert!(launcher.was_killed());
    }

    #[tokio::test]
    async fn cancel_after_limit_keeps_limit_outcome() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(vec![Step::out("a\nb\n"), Step::Gate(gate)], 0);
        let cancel = CancellationToken::new();

        let mut lines = Vec::new();
        let outcome = run(&launcher, &invocation(), &cancel, |line| {
            lines.push(line);
            // Cancel lands while the killed child is still exiting.
            cancel.cancel();
            Ok(Flow::Stop)
        })
        .await;

        assert_eq!(lines, vec!["a"]);
        assert_eq!(outcome.unwrap(), SearchComplete { limit_hit: true });
        assert!(launcher.was_killed());
    }

    #[tokio::test]
    async fn spawn_failure_is_distinct() {
        let outcome = run(&MissingBinary, &invocation(), &CancellationToken::new(), |_| {
            Ok(Flow::Continue)
        })
        .await;

        assert!(matches!(outcome, Err(SearchError::Spawn { .. })));
    }

    #[tokio::test]
    async fn consumer_errors_abort_the_run() {
        let launcher = FakeLauncher::stdout(["a\nb\n"]);
        let outcome = run(&launcher, &invocation(), &CancellationToken::new(), |_| {
            Err(SearchError::MalformedStream("bad record".into()))
        })
        .await;

        assert!(matches!(outcome, Err(SearchError::MalformedStream(_))));
        assert!(launcher.was_killed());
    }
}
