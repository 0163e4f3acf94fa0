//! Structured git errors and stderr classification.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of classified git failure causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GitErrorKind {
    /// Another git process holds the index lock.
    LockContention,
    /// A ref could not be locked during fetch/pull.
    CannotLockRef,
    /// Pull attempted to rebase onto more than one branch.
    CannotRebaseMultipleBranches,
    AuthenticationFailed,
    /// The directory is not a git repository. Also raised when the git
    /// executable itself cannot be found (ENOENT), a historical conflation
    /// preserved for compatibility.
    NotARepository,
    BadConfigFile,
    RepositoryNotFound,
    RemoteConnection,
    BranchNotFullyMerged,
    UnknownRemoteRef,
    BranchAlreadyExists,
    InvalidBranchName,
    DirtyWorkTree,
    Conflict,
    StashConflict,
    UnmergedChanges,
    NoUpstreamBranch,
    PushRejected,
    NoUserIdentity,
    /// The caller cancelled the operation; never retried.
    Cancelled,
    Unclassified,
}

/// A failed git invocation.
///
/// This structure is the sole error contract exposed to callers; they never
/// parse process output themselves.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("git {command} failed: {message}")]
#[serde(rename_all = "camelCase")]
pub struct GitError {
    /// Human-readable failure message.
    pub message: String,
    /// Raw stdout, when captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Raw stderr, when captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Process exit code, when the process ran to completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Classified failure cause.
    pub kind: GitErrorKind,
    /// The logical command that failed, e.g. `fetch`.
    pub command: String,
}

impl GitError {
    /// Builds an error with no captured process output.
    pub fn new(kind: GitErrorKind, command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stdout: None,
            stderr: None,
            exit_code: None,
            kind,
            command: command.into(),
        }
    }

    /// Builds an error from a completed process, classifying its stderr.
    /// Some conditions (merge conflicts) surface on stdout with an empty
    /// stderr, so stdout is consulted when stderr classifies as nothing.
    pub fn from_output(
        command: impl Into<String>,
        exit_code: i32,
        stdout: String,
        stderr: String,
    ) -> Self {
        let mut kind = classify(&stderr);
        if kind == GitErrorKind::Unclassified && !stdout.is_empty() {
            kind = classify(&stdout);
        }
        let message = match (stderr.trim(), stdout.trim()) {
            ("", "") => format!("exited with code {}", exit_code),
            ("", out) => out.to_string(),
            (err, _) => err.to_string(),
        };
        Self {
            message,
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code: Some(exit_code),
            kind,
            command: command.into(),
        }
    }

    /// Builds a cancellation error.
    pub fn cancelled(command: impl Into<String>) -> Self {
        Self::new(GitErrorKind::Cancelled, command, "operation cancelled")
    }

    /// Replaces the classified kind, used by call sites that refine the
    /// generic classification with operation-specific knowledge.
    pub fn with_kind(mut self, kind: GitErrorKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Ordered classification rules; the first matching pattern wins.
static CLASSIFIER_RULES: LazyLock<Vec<(Regex, GitErrorKind)>> = LazyLock::new(|| {
    // Patterns match the deterministic-locale stderr the executor enforces.
    [
        (
            r"Another git process seems to be running|index\.lock': File exists",
            GitErrorKind::LockContention,
        ),
        (r"cannot lock ref", GitErrorKind::CannotLockRef),
        (
            r"[Cc]annot rebase onto multiple branches",
            GitErrorKind::CannotRebaseMultipleBranches,
        ),
        (
            r"Authentication failed|could not read Username|could not read Password",
            GitErrorKind::AuthenticationFailed,
        ),
        (r"[Nn]ot a git repository", GitErrorKind::NotARepository),
        (r"bad config", GitErrorKind::BadConfigFile),
        (r"[Rr]epository not found", GitErrorKind::RepositoryNotFound),
        (
            r"Could not resolve host|unable to access|Connection refused|Connection timed out",
            GitErrorKind::RemoteConnection,
        ),
        (r"is not fully merged", GitErrorKind::BranchNotFullyMerged),
        (r"couldn't find remote ref", GitErrorKind::UnknownRemoteRef),
        (
            r"branch named '.+' already exists|already exists\.",
            GitErrorKind::BranchAlreadyExists,
        ),
        (
            r"is not a valid branch name|is not a valid ref name",
            GitErrorKind::InvalidBranchName,
        ),
        (
            r"local changes to the following files would be overwritten|Please commit your changes or stash them",
            GitErrorKind::DirtyWorkTree,
        ),
        (
            r"could not restore untracked files from stash",
            GitErrorKind::StashConflict,
        ),
        (r"Merge conflict|CONFLICT \(", GitErrorKind::Conflict),
        (
            r"[Cc]ommitting is not possible because you have unmerged files|'git add/rm <file>'",
            GitErrorKind::UnmergedChanges,
        ),
        (
            r"no upstream branch|no tracking information",
            GitErrorKind::NoUpstreamBranch,
        ),
        (
            r"\[rejected\]|failed to push some refs",
            GitErrorKind::PushRejected,
        ),
        (
            r"Please tell me who you are|unable to auto-detect email address",
            GitErrorKind::NoUserIdentity,
        ),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("invalid classifier pattern"), kind))
    .collect()
});

/// Classifies stderr text into an error kind.
///
/// Classification is advisory: operation-specific call sites may refine or
/// override the result.
pub fn classify(stderr: &str) -> GitErrorKind {
    for (pattern, kind) in CLASSIFIER_RULES.iter() {
        if pattern.is_match(stderr) {
            return *kind;
        }
    }
    GitErrorKind::Unclassified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lock_contention() {
        let stderr = "fatal: Unable to create '/repo/.git/index.lock': File exists.\n\
                      Another git process seems to be running in this repository";
        assert_eq!(classify(stderr), GitErrorKind::LockContention);
    }

    #[test]
    fn test_classify_cannot_lock_ref() {
        assert_eq!(
            classify("error: cannot lock ref 'refs/remotes/origin/main'"),
            GitErrorKind::CannotLockRef
        );
    }

    #[test]
    fn test_classify_not_a_repository() {
        assert_eq!(
            classify("fatal: not a git repository (or any of the parent directories): .git"),
            GitErrorKind::NotARepository
        );
    }

    #[test]
    fn test_classify_auth_failed() {
        assert_eq!(
            classify("fatal: Authentication failed for 'https://example.com/repo.git/'"),
            GitErrorKind::AuthenticationFailed
        );
    }

    #[test]
    fn test_classify_first_match_wins() {
        // Contains both an auth phrase and a network phrase; auth is listed
        // first in the rule table and must win.
        let stderr = "fatal: Authentication failed: unable to access remote";
        assert_eq!(classify(stderr), GitErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_classify_push_rejected() {
        let stderr = " ! [rejected]        main -> main (non-fast-forward)\n\
                      error: failed to push some refs to 'origin'";
        assert_eq!(classify(stderr), GitErrorKind::PushRejected);
    }

    #[test]
    fn test_classify_no_upstream() {
        assert_eq!(
            classify("fatal: The current branch topic has no upstream branch."),
            GitErrorKind::NoUpstreamBranch
        );
    }

    #[test]
    fn test_classify_unclassified() {
        assert_eq!(classify("something entirely unexpected"), GitErrorKind::Unclassified);
    }

    #[test]
    fn test_from_output_classifies() {
        let err = GitError::from_output(
            "checkout",
            1,
            String::new(),
            "error: Your local changes to the following files would be overwritten by checkout"
                .to_string(),
        );
        assert_eq!(err.kind, GitErrorKind::DirtyWorkTree);
        assert_eq!(err.exit_code, Some(1));
        assert_eq!(err.command, "checkout");
    }

    #[test]
    fn test_from_output_merge_conflict_on_stdout() {
        // git merge reports conflicts on stdout with an empty stderr.
        let err = GitError::from_output(
            "merge",
            1,
            "Auto-merging s.txt\nCONFLICT (content): Merge conflict in s.txt\n".to_string(),
            String::new(),
        );
        assert_eq!(err.kind, GitErrorKind::Conflict);
        assert!(err.message.contains("CONFLICT"));
    }

    #[test]
    fn test_from_output_empty_stderr() {
        let err = GitError::from_output("push", 128, String::new(), String::new());
        assert_eq!(err.kind, GitErrorKind::Unclassified);
        assert_eq!(err.message, "exited with code 128");
    }

    #[test]
    fn test_with_kind_override() {
        let err = GitError::from_output("commit", 1, String::new(), "odd output".to_string())
            .with_kind(GitErrorKind::UnmergedChanges);
        assert_eq!(err.kind, GitErrorKind::UnmergedChanges);
    }

    #[test]
    fn test_error_serialization() {
        let err = GitError::new(GitErrorKind::Cancelled, "fetch", "operation cancelled");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"kind\":\"cancelled\""));
        assert!(json.contains("\"command\":\"fetch\""));
    }
}
