//! Per-repository operation runner and state machine.
//!
//! A repository is `Idle` until the executable reports its directory is no
//! longer a valid repository, at which point it becomes `Disposed` and every
//! subsequent operation fails fast without spawning a process. While not
//! disposed, any number of named operations may be in flight concurrently;
//! mutual exclusion is left to git's own index lock, whose contention errors
//! are retried with quadratic backoff.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::broadcast::{ProgressBroadcaster, RepositoryEvent, StateBroadcaster};
use crate::config::EngineConfig;
use crate::git::parse::{self, StatusList, StatusParser};
use crate::git::types::{Commit, Head, Ref, Remote, StashEntry, Submodule, TreeRow, UpstreamRef};
use crate::git::{CancelFlag, ExecOptions, GitError, GitErrorKind, GitExecutor};
use crate::operation::{OperationKind, RunningOperations};
use crate::progress::ProgressPhase;
use crate::reconciler::{self, QueryBatch};
use crate::resource::RepositorySnapshot;

/// Fixed log format: hash, author email, parents, body, double-NUL
/// record terminator.
const LOG_FORMAT: &str = "%H%n%ae%n%P%n%B%x00%x00";

/// Lifecycle state of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryState {
    Idle,
    Disposed,
}

/// Computes the quadratic backoff delay for a failed attempt.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    Duration::from_millis(u64::from(attempt) * u64::from(attempt) * base_ms)
}

/// Whether a failure of `error` during `kind` is worth retrying.
///
/// Lock contention is transient for every operation; ref-lock and
/// multi-branch-rebase conflicts only for the network sync operations.
fn should_retry(kind: OperationKind, error: GitErrorKind) -> bool {
    match error {
        GitErrorKind::LockContention => true,
        GitErrorKind::CannotLockRef | GitErrorKind::CannotRebaseMultipleBranches => matches!(
            kind,
            OperationKind::Fetch | OperationKind::Pull | OperationKind::Sync
        ),
        _ => false,
    }
}

/// A single open working copy.
pub struct Repository {
    root: PathBuf,
    git_dir: PathBuf,
    executor: GitExecutor,
    config: EngineConfig,
    disposed: AtomicBool,
    operations: Mutex<RunningOperations>,
    snapshot: RwLock<Arc<RepositorySnapshot>>,
    state_events: StateBroadcaster,
    progress: ProgressBroadcaster,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("git_dir", &self.git_dir)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Opens a working copy, validating it against the executable and
    /// resolving its git directory.
    pub async fn open(
        root: impl Into<PathBuf>,
        config: EngineConfig,
        state_events: StateBroadcaster,
        progress: ProgressBroadcaster,
    ) -> Result<Self, GitError> {
        let root = root.into();
        let executor = GitExecutor::new(&config.git_path);

        let result = executor
            .run(&root, &["rev-parse", "--git-dir"], ExecOptions::default())
            .await?;
        let raw = PathBuf::from(result.stdout.trim());
        let git_dir = if raw.is_absolute() { raw } else { root.join(raw) };

        Ok(Self {
            root,
            git_dir,
            executor,
            config,
            disposed: AtomicBool::new(false),
            operations: Mutex::new(RunningOperations::default()),
            snapshot: RwLock::new(Arc::new(RepositorySnapshot::default())),
            state_events,
            progress,
        })
    }

    /// Initializes a new repository at `path`.
    pub async fn init(path: &Path, config: &EngineConfig) -> Result<(), GitError> {
        let executor = GitExecutor::new(&config.git_path);
        executor
            .run(path, &["init"], ExecOptions::default())
            .await
            .map(|_| ())
    }

    /// Clones `url` into `target`; the cancellation flag kills the child
    /// process when it fires.
    pub async fn clone(
        url: &str,
        target: &Path,
        config: &EngineConfig,
        cancel: CancelFlag,
    ) -> Result<(), GitError> {
        let executor = GitExecutor::new(&config.git_path);
        let parent = target.parent().unwrap_or(Path::new("."));
        let target_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(".")
            .to_string();
        let opts = ExecOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        executor
            .run(
                parent,
                &["clone", "--progress", url, &target_name],
                opts,
            )
            .await
            .map(|_| ())
    }

    /// The working copy root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The resolved git directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RepositoryState {
        if self.disposed.load(Ordering::Acquire) {
            RepositoryState::Disposed
        } else {
            RepositoryState::Idle
        }
    }

    /// True once the repository has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Marks the repository disposed; subsequent operations fail fast.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// The latest snapshot, replaced wholesale on every reconciliation.
    pub fn snapshot(&self) -> Arc<RepositorySnapshot> {
        Arc::clone(&self.snapshot.read().expect("snapshot lock poisoned"))
    }

    /// True while at least one operation of this kind is in flight.
    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.operations
            .lock()
            .expect("operations lock poisoned")
            .is_running(kind)
    }

    /// Idle means no mutating operation is in flight.
    pub fn is_idle(&self) -> bool {
        self.operations
            .lock()
            .expect("operations lock poisoned")
            .is_idle()
    }

    /// Whether a filesystem trigger may refresh this repository right now.
    /// Suppressed while disposed, while any mutating operation is in
    /// flight, and while the repository is huge (status previously hit the
    /// result cap).
    pub fn should_auto_refresh(&self) -> bool {
        self.config.auto_refresh
            && !self.is_disposed()
            && self.is_idle()
            && !self.snapshot().hit_limit
    }

    /// The progress broadcaster for this repository's operations.
    pub fn progress(&self) -> &ProgressBroadcaster {
        &self.progress
    }

    // ========================================================================
    // Operation runner
    // ========================================================================

    /// Runs one logical operation: counts it in the in-flight multiset,
    /// retries transient failures, and reconciles after successful mutating
    /// operations.
    async fn run<T, F, Fut>(&self, kind: OperationKind, op: F) -> Result<T, GitError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, GitError>>,
    {
        if self.is_disposed() {
            return Err(GitError::new(
                GitErrorKind::NotARepository,
                kind.to_string(),
                "repository is disposed",
            ));
        }

        self.operations
            .lock()
            .expect("operations lock poisoned")
            .start(kind);
        let result = self.run_with_retry(kind, &op).await;
        self.operations
            .lock()
            .expect("operations lock poisoned")
            .finish(kind);

        match &result {
            Err(e) if e.kind == GitErrorKind::NotARepository => {
                log::warn!(
                    "{}: git reports not a repository, disposing",
                    self.root.display()
                );
                self.dispose();
            }
            Ok(_) if !kind.is_read_only() => {
                if let Err(e) = Box::pin(self.refresh()).await {
                    log::warn!(
                        "post-{} refresh failed for {}: {}",
                        kind,
                        self.root.display(),
                        e
                    );
                }
            }
            _ => {}
        }

        result
    }

    async fn run_with_retry<T, F, Fut>(&self, kind: OperationKind, op: &F) -> Result<T, GitError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, GitError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.config.retry_limit || !should_retry(kind, e.kind) {
                        return Err(e);
                    }
                    let delay = backoff_delay(attempt, self.config.retry_backoff_base_ms);
                    log::debug!(
                        "{}: {} failed with {:?}, retry {} in {:?}",
                        self.root.display(),
                        kind,
                        e.kind,
                        attempt,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Rebuilds the snapshot from one coherent batch of read-only queries,
    /// replaces the stored snapshot atomically, and broadcasts it by value.
    ///
    /// Overlapping reconciliations are not ordered; the engine keeps
    /// whichever snapshot completes last.
    pub async fn refresh(&self) -> Result<Arc<RepositorySnapshot>, GitError> {
        let batch = match self.query_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                if e.kind == GitErrorKind::NotARepository {
                    self.dispose();
                }
                return Err(e);
            }
        };
        let snapshot = Arc::new(reconciler::assemble_snapshot(batch, &self.config));

        *self.snapshot.write().expect("snapshot lock poisoned") = Arc::clone(&snapshot);
        self.state_events.send(RepositoryEvent::StatusChanged {
            path: self.root.clone(),
            snapshot: (*snapshot).clone(),
        });

        Ok(snapshot)
    }

    async fn query_batch(&self) -> Result<QueryBatch, GitError> {
        let status = self.query_status().await?;
        let head = self.query_head().await;
        let refs = self.query_refs().await?;
        let remotes = self.query_remotes().await?;
        let submodules = self.query_submodules().await;
        let stashes = self.query_stashes().await?;
        let rebase_commit = self.query_rebase_commit().await;

        Ok(QueryBatch {
            head,
            refs,
            remotes,
            submodules,
            stashes,
            rebase_commit,
            status,
        })
    }

    async fn query_status(&self) -> Result<StatusList, GitError> {
        let result = self
            .executor
            .run(
                &self.root,
                &["status", "-z", "-uall"],
                ExecOptions::default(),
            )
            .await?;

        let mut parser = StatusParser::new(self.config.status_limit);
        parser.feed(&result.stdout);
        Ok(parser.finish())
    }

    /// Assembles the Head from probing queries; each probe tolerates
    /// failure so a fresh repository yields an all-empty Head.
    async fn query_head(&self) -> Head {
        let name = self
            .probe(&["symbolic-ref", "--short", "HEAD"])
            .await
            .filter(|s| !s.is_empty());
        let commit = self.probe(&["rev-parse", "HEAD"]).await;

        let upstream = self
            .probe(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await
            .and_then(|full| {
                let (remote, branch) = full.split_once('/')?;
                Some(UpstreamRef {
                    remote: remote.to_string(),
                    name: branch.to_string(),
                })
            });

        let (ahead, behind) = if upstream.is_some() {
            let counts = self
                .probe(&["rev-list", "--left-right", "--count", "HEAD...@{u}"])
                .await
                .and_then(|s| parse::parse_ahead_behind(&s));
            match counts {
                Some((a, b)) => (Some(a), Some(b)),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        Head {
            name,
            commit,
            upstream,
            ahead,
            behind,
        }
    }

    async fn query_refs(&self) -> Result<Vec<Ref>, GitError> {
        let result = self
            .executor
            .run(
                &self.root,
                &[
                    "for-each-ref",
                    "--format=%(refname) %(objectname)",
                    "--sort=-committerdate",
                ],
                ExecOptions::default(),
            )
            .await?;
        Ok(parse::parse_refs(&result.stdout))
    }

    async fn query_remotes(&self) -> Result<Vec<Remote>, GitError> {
        let result = self
            .executor
            .run(&self.root, &["remote", "-v"], ExecOptions::default())
            .await?;
        Ok(parse::parse_remotes(&result.stdout))
    }

    /// Submodules come from the descriptor file at the repository root,
    /// not from the executable.
    async fn query_submodules(&self) -> Vec<Submodule> {
        match tokio::fs::read_to_string(self.root.join(".gitmodules")).await {
            Ok(content) => parse::parse_gitmodules(&content),
            Err(_) => Vec::new(),
        }
    }

    async fn query_stashes(&self) -> Result<Vec<StashEntry>, GitError> {
        let result = self
            .executor
            .run(&self.root, &["stash", "list"], ExecOptions::default())
            .await?;
        Ok(parse::parse_stash_list(&result.stdout))
    }

    /// Reads the commit an interrupted rebase stopped at, if a rebase
    /// marker directory exists. Best-effort: lookup failures yield `None`.
    async fn query_rebase_commit(&self) -> Option<Commit> {
        let rebase_merge = self.git_dir.join("rebase-merge");
        let rebase_apply = self.git_dir.join("rebase-apply");
        if !rebase_merge.is_dir() && !rebase_apply.is_dir() {
            return None;
        }

        let head = tokio::fs::read_to_string(self.git_dir.join("REBASE_HEAD"))
            .await
            .ok()?;
        self.show_commit(head.trim()).await.ok()
    }

    async fn probe(&self, args: &[&str]) -> Option<String> {
        let result = self
            .executor
            .run_unchecked(&self.root, args, ExecOptions::default())
            .await
            .ok()?;
        if result.success() {
            Some(result.stdout.trim().to_string())
        } else {
            None
        }
    }

    // ========================================================================
    // Read-only operations
    // ========================================================================

    /// Full status enumeration via the streaming NUL-delimited parser.
    pub async fn status(&self) -> Result<StatusList, GitError> {
        self.run(OperationKind::Status, || self.query_status()).await
    }

    /// Unified diff for one path, staged or unstaged.
    pub async fn diff(&self, path: &str, cached: bool) -> Result<String, GitError> {
        self.run(OperationKind::Diff, || async move {
            let mut args = vec!["diff", "--no-ext-diff"];
            if cached {
                args.push("--cached");
            }
            args.push("--");
            args.push(path);
            let result = self
                .executor
                .run_unchecked(&self.root, &args, ExecOptions::default())
                .await?;
            // diff exits 1 when differences exist
            if result.exit_code == 0 || result.exit_code == 1 {
                Ok(result.stdout)
            } else {
                Err(GitError::from_output(
                    "diff",
                    result.exit_code,
                    result.stdout,
                    result.stderr,
                ))
            }
        })
        .await
    }

    /// Blame output for one path.
    pub async fn blame(&self, path: &str) -> Result<String, GitError> {
        self.run(OperationKind::Blame, || async move {
            let result = self
                .executor
                .run(
                    &self.root,
                    &["blame", "--root", "--", path],
                    ExecOptions::default(),
                )
                .await?;
            Ok(result.stdout)
        })
        .await
    }

    /// The most recent commits, newest first.
    pub async fn log(&self, limit: u32) -> Result<Vec<Commit>, GitError> {
        self.run(OperationKind::Log, || async move {
            let count = limit.to_string();
            let format = format!("--format={}", LOG_FORMAT);
            let result = self
                .executor
                .run(
                    &self.root,
                    &["log", "-n", &count, &format],
                    ExecOptions::default(),
                )
                .await?;
            Ok(parse::parse_commits(&result.stdout))
        })
        .await
    }

    /// Metadata for a single commit.
    pub async fn show_commit(&self, rev: &str) -> Result<Commit, GitError> {
        self.run(OperationKind::Show, || async move {
            let format = format!("--format={}", LOG_FORMAT);
            let result = self
                .executor
                .run(
                    &self.root,
                    &["show", "-s", &format, rev],
                    ExecOptions::default(),
                )
                .await?;
            parse::parse_commits(&result.stdout)
                .into_iter()
                .next()
                .ok_or_else(|| {
                    GitError::new(GitErrorKind::Unclassified, "show", "empty commit record")
                })
        })
        .await
    }

    /// File content at a revision, decoded with the given encoding.
    pub async fn show_file(
        &self,
        rev: &str,
        path: &str,
        encoding: Option<&str>,
    ) -> Result<String, GitError> {
        let spec = format!("{}:{}", rev, path);
        let encoding = encoding.map(str::to_string);
        self.run(OperationKind::Show, || {
            let spec = spec.clone();
            let encoding = encoding.clone();
            async move {
                let opts = ExecOptions {
                    encoding,
                    ..Default::default()
                };
                let result = self.executor.run(&self.root, &["show", &spec], opts).await?;
                Ok(result.stdout)
            }
        })
        .await
    }

    /// Tree/index row for one path at a revision. Speculative lookup used
    /// to size previews; failures are swallowed by design.
    pub async fn object_details(&self, rev: &str, path: &str) -> Option<TreeRow> {
        let result = self
            .run(OperationKind::GetObjectDetails, || async move {
                let result = self
                    .executor
                    .run(
                        &self.root,
                        &["ls-tree", "-l", rev, "--", path],
                        ExecOptions::default(),
                    )
                    .await?;
                Ok(parse::parse_tree_rows(&result.stdout).into_iter().next())
            })
            .await;
        match result {
            Ok(row) => row,
            Err(e) => {
                log::debug!("object lookup {}:{} failed: {}", rev, path, e);
                None
            }
        }
    }

    /// Tree listing at a revision.
    pub async fn ls_tree(&self, rev: &str) -> Result<Vec<TreeRow>, GitError> {
        self.run(OperationKind::LsTree, || async move {
            let result = self
                .executor
                .run(
                    &self.root,
                    &["ls-tree", "-l", "-r", rev],
                    ExecOptions::default(),
                )
                .await?;
            Ok(parse::parse_tree_rows(&result.stdout))
        })
        .await
    }

    /// The merge base of two revisions, when one exists.
    pub async fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError> {
        self.run(OperationKind::MergeBase, || async move {
            let result = self
                .executor
                .run_unchecked(&self.root, &["merge-base", a, b], ExecOptions::default())
                .await?;
            if result.success() {
                Ok(Some(result.stdout.trim().to_string()))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Reads one configuration value.
    pub async fn config_read(&self, key: &str) -> Result<Option<String>, GitError> {
        self.run(OperationKind::ConfigRead, || async move {
            let result = self
                .executor
                .run_unchecked(
                    &self.root,
                    &["config", "--get", key],
                    ExecOptions::default(),
                )
                .await?;
            if result.success() {
                Ok(Some(result.stdout.trim().to_string()))
            } else {
                Ok(None)
            }
        })
        .await
    }

    // ========================================================================
    // Mutating operations
    // ========================================================================

    /// Fetches from all remotes. Counted but runs without progress UI.
    pub async fn fetch(&self, cancel: CancelFlag) -> Result<(), GitError> {
        self.run_network(OperationKind::Fetch, &["fetch", "--progress", "--all"], cancel)
            .await
    }

    /// Pulls the current branch from its upstream.
    pub async fn pull(&self, cancel: CancelFlag) -> Result<(), GitError> {
        self.run_network(OperationKind::Pull, &["pull", "--progress"], cancel)
            .await
    }

    /// Pushes the current branch to its upstream.
    pub async fn push(&self, cancel: CancelFlag) -> Result<(), GitError> {
        self.run_network(OperationKind::Push, &["push", "--progress"], cancel)
            .await
    }

    /// Pull then push, as one logical operation.
    pub async fn sync(&self, cancel: CancelFlag) -> Result<(), GitError> {
        self.run(OperationKind::Sync, || {
            let cancel = cancel.clone();
            async move {
                let progress = self.progress.start_operation(OperationKind::Sync);
                progress.phase(ProgressPhase::Starting, "Synchronizing");

                let opts = ExecOptions {
                    cancel: Some(cancel.clone()),
                    ..Default::default()
                };
                let pull = self
                    .executor
                    .run_streaming(&self.root, &["pull", "--progress"], opts, &|line| {
                        progress.raw_output(line)
                    })
                    .await;
                if let Err(e) = pull {
                    progress.failed(&e.message);
                    return Err(e);
                }

                let opts = ExecOptions {
                    cancel: Some(cancel),
                    ..Default::default()
                };
                let push = self
                    .executor
                    .run_streaming(&self.root, &["push", "--progress"], opts, &|line| {
                        progress.raw_output(line)
                    })
                    .await;
                match push {
                    Ok(_) => {
                        progress.completed("Sync completed");
                        Ok(())
                    }
                    Err(e) => {
                        progress.failed(&e.message);
                        Err(e)
                    }
                }
            }
        })
        .await
    }

    async fn run_network(
        &self,
        kind: OperationKind,
        args: &[&str],
        cancel: CancelFlag,
    ) -> Result<(), GitError> {
        self.run(kind, || {
            let cancel = cancel.clone();
            async move {
                let progress = self.progress.start_operation(kind);
                let opts = ExecOptions {
                    cancel: Some(cancel),
                    ..Default::default()
                };
                let result = self
                    .executor
                    .run_streaming(&self.root, args, opts, &|line| progress.raw_output(line))
                    .await;
                match result {
                    Ok(_) => {
                        progress.completed("Completed");
                        Ok(())
                    }
                    Err(e) => {
                        progress.failed(&e.message);
                        Err(e)
                    }
                }
            }
        })
        .await
    }

    /// Creates a commit from the staged changes.
    pub async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.run(OperationKind::Commit, || async move {
            let result = self
                .executor
                .run(
                    &self.root,
                    &["commit", "-m", message],
                    ExecOptions::default(),
                )
                .await;
            match result {
                Ok(_) => Ok(()),
                // The generic classifier cannot see this condition; it only
                // exists after a commit attempt.
                Err(e) if mentions_unmerged(&e) => Err(e.with_kind(GitErrorKind::UnmergedChanges)),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Stages paths into the index.
    pub async fn stage(&self, paths: &[&str]) -> Result<(), GitError> {
        self.run(OperationKind::Stage, || async move {
            let mut args = vec!["add", "--"];
            args.extend_from_slice(paths);
            self.executor
                .run(&self.root, &args, ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Removes paths from the index, keeping working-tree content.
    pub async fn unstage(&self, paths: &[&str]) -> Result<(), GitError> {
        self.run(OperationKind::Unstage, || async move {
            let mut args = vec!["reset", "-q", "HEAD", "--"];
            args.extend_from_slice(paths);
            self.executor
                .run(&self.root, &args, ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Discards working-tree changes for the given paths.
    pub async fn clean(&self, paths: &[&str]) -> Result<(), GitError> {
        self.run(OperationKind::Clean, || async move {
            let mut args = vec!["checkout", "-q", "--"];
            args.extend_from_slice(paths);
            self.executor
                .run(&self.root, &args, ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Checks out a branch or revision.
    pub async fn checkout(&self, rev: &str) -> Result<(), GitError> {
        self.run(OperationKind::Checkout, || async move {
            self.executor
                .run(&self.root, &["checkout", "-q", rev], ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Creates a branch, optionally checking it out.
    pub async fn create_branch(&self, name: &str, checkout: bool) -> Result<(), GitError> {
        self.run(OperationKind::Branch, || async move {
            let args: Vec<&str> = if checkout {
                vec!["checkout", "-q", "-b", name]
            } else {
                vec!["branch", name]
            };
            self.executor
                .run(&self.root, &args, ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Deletes a branch; without `force` this fails with
    /// branch-not-fully-merged when unmerged.
    pub async fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        self.run(OperationKind::DeleteBranch, || async move {
            let flag = if force { "-D" } else { "-d" };
            self.executor
                .run(&self.root, &["branch", flag, name], ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Merges a revision into the current branch.
    pub async fn merge(&self, rev: &str) -> Result<(), GitError> {
        self.run(OperationKind::Merge, || async move {
            self.executor
                .run(&self.root, &["merge", rev], ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Resets the current branch to a revision.
    pub async fn reset(&self, rev: &str, hard: bool) -> Result<(), GitError> {
        self.run(OperationKind::Reset, || async move {
            let args: Vec<&str> = if hard {
                vec!["reset", "--hard", rev]
            } else {
                vec!["reset", "--soft", rev]
            };
            self.executor
                .run(&self.root, &args, ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Creates a tag, annotated when a message is given.
    pub async fn tag(&self, name: &str, message: Option<&str>) -> Result<(), GitError> {
        self.run(OperationKind::Tag, || async move {
            let args: Vec<&str> = match message {
                Some(message) => vec!["tag", "-a", name, "-m", message],
                None => vec!["tag", name],
            };
            self.executor
                .run(&self.root, &args, ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Saves working-tree changes to a new stash entry.
    pub async fn stash_push(
        &self,
        message: Option<&str>,
        include_untracked: bool,
    ) -> Result<(), GitError> {
        self.run(OperationKind::Stash, || async move {
            let mut args = vec!["stash", "push"];
            if include_untracked {
                args.push("-u");
            }
            if let Some(message) = message {
                args.push("-m");
                args.push(message);
            }
            self.executor
                .run(&self.root, &args, ExecOptions::default())
                .await
                .map(|_| ())
        })
        .await
    }

    /// Applies and drops a stash entry by position.
    pub async fn stash_pop(&self, index: usize) -> Result<(), GitError> {
        self.stash_command("pop", index).await
    }

    /// Applies a stash entry by position, keeping it in the list.
    pub async fn stash_apply(&self, index: usize) -> Result<(), GitError> {
        self.stash_command("apply", index).await
    }

    /// Drops a stash entry by position.
    pub async fn stash_drop(&self, index: usize) -> Result<(), GitError> {
        self.stash_command("drop", index).await
    }

    async fn stash_command(&self, action: &str, index: usize) -> Result<(), GitError> {
        let selector = format!("stash@{{{}}}", index);
        self.run(OperationKind::Stash, || {
            let selector = selector.clone();
            async move {
                let result = self
                    .executor
                    .run(
                        &self.root,
                        &["stash", action, &selector],
                        ExecOptions::default(),
                    )
                    .await;
                match result {
                    Ok(_) => Ok(()),
                    // A conflicting pop/apply surfaces as a stash conflict,
                    // not a generic merge conflict.
                    Err(e) if e.kind == GitErrorKind::Conflict => {
                        Err(e.with_kind(GitErrorKind::StashConflict))
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Applies a patch from stdin to the working tree.
    pub async fn apply_patch(&self, patch: &str) -> Result<(), GitError> {
        self.run(OperationKind::Apply, || {
            let patch = patch.to_string();
            async move {
                let opts = ExecOptions {
                    stdin: Some(patch),
                    ..Default::default()
                };
                self.executor
                    .run(&self.root, &["apply", "-"], opts)
                    .await
                    .map(|_| ())
            }
        })
        .await
    }
}

fn mentions_unmerged(error: &GitError) -> bool {
    let in_text = |text: &Option<String>| {
        text.as_deref()
            .is_some_and(|t| t.contains("unmerged") || t.contains("not concluded your merge"))
    };
    in_text(&error.stdout) || in_text(&error.stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn init_repo(dir: &TempDir) {
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .current_dir(dir.path())
                .args(args)
                .output()
                .unwrap()
        };
        run(&["init", "-q"]);
        run(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        run(&["config", "user.email", "test@test.com"]);
        run(&["config", "user.name", "Test"]);
    }

    async fn open_repo(dir: &TempDir, config: EngineConfig) -> Repository {
        Repository::open(
            dir.path(),
            config,
            StateBroadcaster::default(),
            ProgressBroadcaster::default(),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_open_rejects_non_repository() {
        let dir = TempDir::new().unwrap();
        let err = runtime()
            .block_on(Repository::open(
                dir.path(),
                EngineConfig::default(),
                StateBroadcaster::default(),
                ProgressBroadcaster::default(),
            ))
            .unwrap_err();
        assert_eq!(err.kind, GitErrorKind::NotARepository);
    }

    #[test]
    fn test_backoff_delay_schedule() {
        assert_eq!(backoff_delay(1, 50), Duration::from_millis(50));
        assert_eq!(backoff_delay(2, 50), Duration::from_millis(200));
        assert_eq!(backoff_delay(3, 50), Duration::from_millis(450));

        // Total wait for N consecutive failures is the sum of squares.
        let total: Duration = (1..=3).map(|i| backoff_delay(i, 50)).sum();
        assert_eq!(total, Duration::from_millis((1 + 4 + 9) * 50));
    }

    #[test]
    fn test_should_retry_matrix() {
        assert!(should_retry(
            OperationKind::Commit,
            GitErrorKind::LockContention
        ));
        assert!(should_retry(
            OperationKind::Status,
            GitErrorKind::LockContention
        ));
        assert!(should_retry(OperationKind::Fetch, GitErrorKind::CannotLockRef));
        assert!(should_retry(
            OperationKind::Pull,
            GitErrorKind::CannotRebaseMultipleBranches
        ));
        assert!(!should_retry(
            OperationKind::Commit,
            GitErrorKind::CannotLockRef
        ));
        assert!(!should_retry(
            OperationKind::Fetch,
            GitErrorKind::AuthenticationFailed
        ));
        assert!(!should_retry(OperationKind::Fetch, GitErrorKind::Cancelled));
    }

    #[test]
    fn test_disposed_rejects_without_invoking() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));

        repo.dispose();
        assert_eq!(repo.state(), RepositoryState::Disposed);

        let calls = AtomicU32::new(0);
        let err = rt
            .block_on(repo.run(OperationKind::Commit, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap_err();
        assert_eq!(err.kind, GitErrorKind::NotARepository);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(repo.is_idle());
    }

    #[test]
    fn test_no_retry_on_non_transient_error() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));

        let calls = AtomicU32::new(0);
        let err = rt
            .block_on(repo.run(OperationKind::Fetch, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GitError::new(
                    GitErrorKind::AuthenticationFailed,
                    "fetch",
                    "denied",
                ))
            }))
            .unwrap_err();
        assert_eq!(err.kind, GitErrorKind::AuthenticationFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lock_contention_retried_until_success() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let rt = runtime();
        let config = EngineConfig {
            retry_backoff_base_ms: 1,
            ..Default::default()
        };
        let repo = rt.block_on(open_repo(&dir, config));

        let calls = AtomicU32::new(0);
        let value = rt
            .block_on(repo.run(OperationKind::Status, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(GitError::new(GitErrorKind::LockContention, "status", "locked"))
                } else {
                    Ok(n)
                }
            }))
            .unwrap();
        // Three lock failures, success on the fourth attempt.
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_retry_ceiling_exhausted() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let rt = runtime();
        let config = EngineConfig {
            retry_limit: 3,
            retry_backoff_base_ms: 1,
            ..Default::default()
        };
        let repo = rt.block_on(open_repo(&dir, config));

        let calls = AtomicU32::new(0);
        let err = rt
            .block_on(repo.run(OperationKind::Status, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GitError::new(
                    GitErrorKind::LockContention,
                    "status",
                    "locked",
                ))
            }))
            .unwrap_err();
        assert_eq!(err.kind, GitErrorKind::LockContention);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_not_a_repository_disposes() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));

        let _ = rt
            .block_on(repo.run(OperationKind::Status, || async {
                Err::<(), _>(GitError::new(
                    GitErrorKind::NotARepository,
                    "status",
                    "gone",
                ))
            }))
            .unwrap_err();
        assert!(repo.is_disposed());
    }

    #[test]
    fn test_status_empty_repository() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));

        let list = rt.block_on(repo.status()).unwrap();
        assert!(list.entries.is_empty());
        assert!(!list.hit_limit);
    }

    #[test]
    fn test_status_untracked_and_limit() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("file{}.txt", i)), "x").unwrap();
        }
        let rt = runtime();
        let config = EngineConfig {
            status_limit: 3,
            ..Default::default()
        };
        let repo = rt.block_on(open_repo(&dir, config));

        let list = rt.block_on(repo.status()).unwrap();
        assert_eq!(list.entries.len(), 3);
        assert!(list.hit_limit);
    }

    #[test]
    fn test_stage_commit_and_refresh_snapshot() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();

        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));
        let mut events = repo.state_events.subscribe();

        rt.block_on(repo.stage(&["a.txt"])).unwrap();
        let snapshot = repo.snapshot();
        assert_eq!(snapshot.groups.index.len(), 1);
        assert_eq!(snapshot.groups.index[0].path, "a.txt");

        rt.block_on(repo.commit("initial")).unwrap();
        let snapshot = repo.snapshot();
        assert!(snapshot.groups.is_empty());
        assert_eq!(snapshot.head.name.as_deref(), Some("main"));
        assert!(snapshot.head.commit.is_some());

        // Each mutating operation broadcast a StatusChanged event.
        let mut status_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RepositoryEvent::StatusChanged { .. }) {
                status_events += 1;
            }
        }
        assert_eq!(status_events, 2);
    }

    #[test]
    fn test_rename_reconciles_into_index_group() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("old.txt"), "content\n").unwrap();

        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));
        rt.block_on(repo.stage(&["old.txt"])).unwrap();
        rt.block_on(repo.commit("add old.txt")).unwrap();

        std::fs::rename(dir.path().join("old.txt"), dir.path().join("new.txt")).unwrap();
        rt.block_on(repo.stage(&["old.txt", "new.txt"])).unwrap();

        let snapshot = repo.snapshot();
        assert_eq!(snapshot.groups.index.len(), 1);
        let resource = &snapshot.groups.index[0];
        assert_eq!(resource.status, crate::resource::StatusType::Renamed);
        // The rename links both paths.
        let mut linked = vec![
            resource.path.clone(),
            resource.rename_target.clone().unwrap(),
        ];
        linked.sort();
        assert_eq!(linked, vec!["new.txt".to_string(), "old.txt".to_string()]);
    }

    #[test]
    fn test_log_and_show_commit() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();

        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));
        rt.block_on(repo.stage(&["a.txt"])).unwrap();
        rt.block_on(repo.commit("first commit")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "two\n").unwrap();
        rt.block_on(repo.stage(&["a.txt"])).unwrap();
        rt.block_on(repo.commit("second commit")).unwrap();

        let commits = rt.block_on(repo.log(10)).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message.trim(), "second commit");
        assert_eq!(commits[0].author_email, "test@test.com");
        assert_eq!(commits[0].parents, vec![commits[1].hash.clone()]);
        assert!(commits[1].parents.is_empty());

        let shown = rt.block_on(repo.show_commit(&commits[0].hash)).unwrap();
        assert_eq!(shown.hash, commits[0].hash);
    }

    #[test]
    fn test_refs_after_branch_and_tag() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();

        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));
        rt.block_on(repo.stage(&["a.txt"])).unwrap();
        rt.block_on(repo.commit("init")).unwrap();
        rt.block_on(repo.create_branch("topic", false)).unwrap();
        rt.block_on(repo.tag("v1", Some("release"))).unwrap();

        let snapshot = repo.snapshot();
        let names: Vec<_> = snapshot.refs.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"main"));
        assert!(names.contains(&"topic"));
        assert!(names.contains(&"v1"));
    }

    #[test]
    fn test_stash_round_trip() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.txt"), "base\n").unwrap();

        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));
        rt.block_on(repo.stage(&["a.txt"])).unwrap();
        rt.block_on(repo.commit("base")).unwrap();

        std::fs::write(dir.path().join("a.txt"), "changed\n").unwrap();
        rt.block_on(repo.stash_push(Some("wip"), false)).unwrap();

        let snapshot = repo.snapshot();
        assert_eq!(snapshot.stashes.len(), 1);
        assert_eq!(snapshot.stashes[0].index, 0);
        assert!(snapshot.stashes[0].description.contains("wip"));
        assert!(snapshot.groups.is_empty());

        rt.block_on(repo.stash_pop(0)).unwrap();
        let snapshot = repo.snapshot();
        assert!(snapshot.stashes.is_empty());
        assert_eq!(snapshot.groups.working_tree.len(), 1);
    }

    #[test]
    fn test_auto_refresh_suppressed_when_huge() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        for i in 0..4 {
            std::fs::write(dir.path().join(format!("f{}.txt", i)), "x").unwrap();
        }

        let rt = runtime();
        let config = EngineConfig {
            status_limit: 2,
            ..Default::default()
        };
        let repo = rt.block_on(open_repo(&dir, config));
        assert!(repo.should_auto_refresh());

        rt.block_on(repo.refresh()).unwrap();
        assert!(repo.snapshot().hit_limit);
        assert!(!repo.should_auto_refresh());
    }

    #[test]
    fn test_delete_branch_not_fully_merged() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();

        let rt = runtime();
        let repo = rt.block_on(open_repo(&dir, EngineConfig::default()));
        rt.block_on(repo.stage(&["a.txt"])).unwrap();
        rt.block_on(repo.commit("init")).unwrap();
        rt.block_on(repo.create_branch("topic", true)).unwrap();
        std::fs::write(dir.path().join("b.txt"), "y\n").unwrap();
        rt.block_on(repo.stage(&["b.txt"])).unwrap();
        rt.block_on(repo.commit("topic work")).unwrap();
        rt.block_on(repo.checkout("main")).unwrap();

        let err = rt.block_on(repo.delete_branch("topic", false)).unwrap_err();
        assert_eq!(err.kind, GitErrorKind::BranchNotFullyMerged);

        rt.block_on(repo.delete_branch("topic", true)).unwrap();
    }
}
