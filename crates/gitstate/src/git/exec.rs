//! Process runner for the external git executable.
//!
//! Spawns git with piped stdio, streams stderr line-by-line (where progress
//! output lands), decodes stdout, and enforces cooperative cancellation by
//! killing the child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::error::{GitError, GitErrorKind};

/// How often the executor checks the cancellation flag while the child runs.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared cooperative cancellation flag.
///
/// Cloning shares the underlying flag; once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a new, un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Payload written to the child's stdin.
    pub stdin: Option<String>,
    /// Stdout encoding name. Anything other than UTF-8 (or invalid bytes)
    /// silently falls back to lossy UTF-8.
    pub encoding: Option<String>,
    /// Cooperative cancellation; the child is killed when it fires.
    pub cancel: Option<CancelFlag>,
}

/// Result of a completed git invocation.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Process exit code; -1 when terminated by a signal.
    pub exit_code: i32,
    /// Decoded stdout.
    pub stdout: String,
    /// Raw stderr text.
    pub stderr: String,
}

impl ExecResult {
    /// True when the process exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Decodes stdout bytes using the named encoding, defaulting to UTF-8.
///
/// Decode failures and unsupported encodings silently fall back to lossy
/// UTF-8.
pub fn decode_output(bytes: &[u8], encoding: Option<&str>) -> String {
    if let Some(name) = encoding {
        if !name.eq_ignore_ascii_case("utf-8") && !name.eq_ignore_ascii_case("utf8") {
            log::debug!("unsupported output encoding '{}', falling back to UTF-8", name);
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Runs the git executable.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    git_path: PathBuf,
}

impl GitExecutor {
    /// Creates an executor for the given git executable path.
    pub fn new(git_path: impl Into<PathBuf>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    /// Returns the configured executable path.
    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    /// Runs git and fails with a classified error on non-zero exit.
    pub async fn run(
        &self,
        cwd: &Path,
        args: &[&str],
        opts: ExecOptions,
    ) -> Result<ExecResult, GitError> {
        let command = logical_command(args);
        let result = self.exec(cwd, args, opts, None).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(GitError::from_output(
                command,
                result.exit_code,
                result.stdout,
                result.stderr,
            ))
        }
    }

    /// Runs git and returns the result regardless of exit code.
    ///
    /// Used by probing call sites (rev-parse lookups, diff) where a non-zero
    /// exit is an answer, not a failure.
    pub async fn run_unchecked(
        &self,
        cwd: &Path,
        args: &[&str],
        opts: ExecOptions,
    ) -> Result<ExecResult, GitError> {
        self.exec(cwd, args, opts, None).await
    }

    /// Runs git, forwarding each stderr line to `on_stderr` as it arrives.
    /// Fails with a classified error on non-zero exit.
    pub async fn run_streaming(
        &self,
        cwd: &Path,
        args: &[&str],
        opts: ExecOptions,
        on_stderr: &(dyn Fn(&str) + Sync),
    ) -> Result<ExecResult, GitError> {
        let command = logical_command(args);
        let result = self.exec(cwd, args, opts, Some(on_stderr)).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(GitError::from_output(
                command,
                result.exit_code,
                result.stdout,
                result.stderr,
            ))
        }
    }

    async fn exec(
        &self,
        cwd: &Path,
        args: &[&str],
        opts: ExecOptions,
        on_stderr: Option<&(dyn Fn(&str) + Sync)>,
    ) -> Result<ExecResult, GitError> {
        let command = logical_command(args);
        let ExecOptions {
            stdin,
            encoding,
            cancel,
        } = opts;

        let mut cmd = Command::new(&self.git_path);
        cmd.args(args)
            .current_dir(cwd)
            // Deterministic locale so stderr matches the classifier, and no
            // optimistic index locks during read-only queries.
            .env("LC_ALL", "en_US.UTF-8")
            .env("LANG", "en_US.UTF-8")
            .env("GIT_OPTIONAL_LOCKS", "0")
            .env("GIT_PAGER", "cat")
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                // ENOENT historically maps to not-a-repository; preserved.
                GitError::new(
                    GitErrorKind::NotARepository,
                    &command,
                    format!("git executable not found: {}", e),
                )
            } else {
                GitError::new(GitErrorKind::Unclassified, &command, e.to_string())
            }
        })?;

        let mut stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        if stdout_pipe.is_none() || stderr_pipe.is_none() {
            let _ = child.start_kill();
            return Err(GitError::new(
                GitErrorKind::Unclassified,
                &command,
                "failed to open process streams",
            ));
        }

        let stdin_task = async {
            if let (Some(mut pipe), Some(payload)) = (stdin_pipe.take(), stdin) {
                let _ = pipe.write_all(payload.as_bytes()).await;
                let _ = pipe.shutdown().await;
            }
        };

        let stdout_task = async {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        };

        let stderr_task = async {
            let mut text = String::new();
            if let Some(pipe) = stderr_pipe {
                let reader = BufReader::new(pipe);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(cb) = on_stderr {
                        cb(&line);
                    }
                    text.push_str(&line);
                    text.push('\n');
                }
            }
            text
        };

        // Awaits the child while polling the cancellation flag; returns
        // `None` when the run was cancelled and the child killed.
        let wait_task = async {
            let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
            loop {
                if let Some(flag) = &cancel {
                    if flag.is_cancelled() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return None;
                    }
                }
                tokio::select! {
                    status = child.wait() => return Some(status),
                    _ = poll.tick() => {}
                }
            }
        };

        let ((), stdout_bytes, stderr_text, status) =
            tokio::join!(stdin_task, stdout_task, stderr_task, wait_task);

        let status = match status {
            None => return Err(GitError::cancelled(&command)),
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                return Err(GitError::new(
                    GitErrorKind::Unclassified,
                    &command,
                    e.to_string(),
                ))
            }
        };

        Ok(ExecResult {
            exit_code: status.code().unwrap_or(-1),
            stdout: decode_output(&stdout_bytes, encoding.as_deref()),
            stderr: stderr_text,
        })
    }
}

/// The logical command name used in error reports, e.g. `fetch`.
fn logical_command(args: &[&str]) -> String {
    args.iter()
        .find(|a| !a.starts_with('-'))
        .copied()
        .unwrap_or("git")
        .to_string()
}
