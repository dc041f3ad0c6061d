// Version-control command execution.
// Runs git in a working directory and returns stdout, or the captured output on failure.

use std::path::Path;
use std::process::Command;

use crate::error::{GitResult, LocalGitError};

/// Narrow interface over the external git executable.
pub trait VcsExecutor: Send + Sync {
    /// Run `git <args>` in `cwd` and return stdout. Non-zero exit is an error.
    fn run(&self, args: &[&str], cwd: &Path) -> GitResult<String>;
}

/// Executes the `git` binary found on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: String,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl VcsExecutor for GitCommand {
    fn run(&self, args: &[&str], cwd: &Path) -> GitResult<String> {
        log::trace!("{} {} (in {})", self.program, args.join(" "), cwd.display());

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| LocalGitError::Launch(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            log::debug!("git {} failed: {}", args.join(" "), stderr.trim());
            return Err(LocalGitError::CommandFailed {
                output: stdout,
                error: stderr,
            });
        }

        Ok(stdout)
    }
}
