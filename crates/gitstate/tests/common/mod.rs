//! Test fixture for integration tests: an isolated working copy driven
//! through the real git executable.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// An isolated git working copy in a temporary directory.
pub struct GitFixture {
    temp: TempDir,
}

impl GitFixture {
    /// Creates an initialized repository with a configured test identity.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp directory");
        let fixture = Self { temp };
        fixture.git(&["init", "-q"]);
        fixture.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        fixture.git(&["config", "user.email", "test@test.com"]);
        fixture.git(&["config", "user.name", "Test"]);
        fixture
    }

    /// Creates an empty directory without a repository.
    pub fn empty() -> Self {
        Self {
            temp: TempDir::new().expect("failed to create temp directory"),
        }
    }

    /// The working copy root.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Runs git in the working copy, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .current_dir(self.temp.path())
            .args(args)
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Writes a file relative to the root.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.temp.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Writes, stages and commits a file in one step.
    pub fn commit_file(&self, rel: &str, content: &str, message: &str) {
        self.write(rel, content);
        self.git(&["add", rel]);
        self.git(&["commit", "-qm", message]);
    }
}
