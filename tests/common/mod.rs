//! Git fixtures for integration tests.
//!
//! Every repository lives in a temporary directory; a shared bare `origin`
//! stands in for the remote so fetch and push never leave the machine.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Run git in `dir` and return trimmed stdout. Panics on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to launch git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn configure(repo: &Path) {
    git(repo, &["config", "user.name", "Test User"]);
    git(repo, &["config", "user.email", "test@example.com"]);
    git(repo, &["config", "commit.gpgsign", "false"]);
}

/// Fresh repository on `main` without any remote.
pub fn init_repo(path: &Path) {
    fs::create_dir_all(path).unwrap();
    git(path, &["init", "--quiet"]);
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    configure(path);
}

/// Write `file` and commit it.
pub fn commit_file(repo: &Path, file: &str, contents: &str, message: &str) {
    fs::write(repo.join(file), contents).unwrap();
    git(repo, &["add", file]);
    git(repo, &["commit", "--quiet", "-m", message]);
}

pub fn head(repo: &Path) -> String {
    git(repo, &["rev-parse", "HEAD"])
}

/// A bare origin with one commit on `main`, plus a publishing clone.
pub struct Remote {
    pub temp_dir: TempDir,
    pub origin: PathBuf,
    /// Clone used to push new upstream commits.
    pub publisher: PathBuf,
}

impl Remote {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let origin = temp_dir.path().join("origin.git");
        fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "--bare", "--quiet"]);
        git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let publisher = temp_dir.path().join("publisher");
        init_repo(&publisher);
        commit_file(&publisher, "README.md", "hello\n", "Initial commit");
        git(&publisher, &["remote", "add", "origin", origin.to_str().unwrap()]);
        git(&publisher, &["push", "--quiet", "-u", "origin", "main"]);

        Self {
            temp_dir,
            origin,
            publisher,
        }
    }

    pub fn url(&self) -> &str {
        self.origin.to_str().unwrap()
    }

    /// Clone origin to `dest`, tracking `origin/main`.
    pub fn clone_to(&self, dest: &Path) {
        let parent = dest.parent().unwrap();
        fs::create_dir_all(parent).unwrap();
        git(parent, &["clone", "--quiet", self.url(), dest.to_str().unwrap()]);
        configure(dest);
    }

    /// Commit a new file in the publisher and push it.
    pub fn publish(&self, file: &str, message: &str) {
        commit_file(&self.publisher, file, message, message);
        git(&self.publisher, &["push", "--quiet"]);
    }

    pub fn origin_head(&self) -> String {
        git(&self.origin, &["rev-parse", "refs/heads/main"])
    }
}
