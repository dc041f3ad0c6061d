// Local working-copy inspection and guarded mutation.
// Every operation is a git invocation in the clone's directory; preconditions are checked first.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GitResult, LocalGitError};

use super::executor::{GitCommand, VcsExecutor};
use super::status::{DETACHED_BRANCH, GitRemote, LocalRepoStatus, LocalSyncState};

const UPSTREAM: &str = "@{u}";

/// What `smart_sync` did, and the state afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartSyncResult {
    pub did_fetch: bool,
    pub did_pull: bool,
    pub did_push: bool,
    pub state: LocalSyncState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBranch {
    pub name: String,
    pub is_current: bool,
    pub upstream: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalWorktree {
    pub path: PathBuf,
    pub head: Option<String>,
    /// `None` for a detached or bare worktree.
    pub branch: Option<String>,
    pub is_detached: bool,
    pub is_current: bool,
}

/// Git operations on local clones.
#[derive(Debug, Clone, Default)]
pub struct LocalGitService<E: VcsExecutor = GitCommand> {
    executor: E,
}

impl LocalGitService<GitCommand> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: VcsExecutor> LocalGitService<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    fn git(&self, path: &Path, args: &[&str]) -> GitResult<String> {
        self.executor.run(args, path)
    }

    /// Current branch, `"detached"` for a detached HEAD, `"unknown"` if git fails.
    pub fn current_branch(&self, path: &Path) -> String {
        match self.git(path, &["rev-parse", "--abbrev-ref", "HEAD"]) {
            Ok(raw) => match raw.trim() {
                "HEAD" => DETACHED_BRANCH.to_string(),
                branch => branch.to_string(),
            },
            Err(_) => "unknown".to_string(),
        }
    }

    /// Clean iff `status --porcelain` prints nothing. Unreadable counts as dirty.
    pub fn is_clean(&self, path: &Path) -> bool {
        self.git(path, &["status", "--porcelain"])
            .map(|output| output.trim().is_empty())
            .unwrap_or(false)
    }

    /// `(ahead, behind)` relative to the upstream; both `None` without one.
    pub fn ahead_behind(&self, path: &Path) -> (Option<u32>, Option<u32>) {
        let Ok(output) = self.git(path, &["rev-list", "--left-right", "--count", "@{u}...HEAD"])
        else {
            return (None, None);
        };
        let mut parts = output.split_whitespace().map(str::parse::<u32>);
        match (parts.next(), parts.next()) {
            (Some(Ok(behind)), Some(Ok(ahead))) => (Some(ahead), Some(behind)),
            _ => (None, None),
        }
    }

    /// Upstream ref name such as `origin/main`.
    pub fn upstream(&self, path: &Path) -> Option<String> {
        self.git(path, &["rev-parse", "--abbrev-ref", "--symbolic-full-name", UPSTREAM])
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    pub fn remote(&self, path: &Path) -> Option<GitRemote> {
        let raw = self.git(path, &["remote", "get-url", "origin"]).ok()?;
        GitRemote::parse(&raw)
    }

    /// Inspect a clone without modifying it.
    pub fn status(&self, path: &Path) -> LocalRepoStatus {
        let branch = self.current_branch(path);
        let is_clean = self.is_clean(path);
        let (ahead, behind) = self.ahead_behind(path);
        let remote = self.remote(path);
        let name = match &remote {
            Some(remote) => remote.name.clone(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };

        LocalRepoStatus {
            path: path.to_path_buf(),
            name,
            full_name: remote.map(|r| r.full_name()),
            branch,
            is_clean,
            ahead_count: ahead,
            behind_count: behind,
            sync_state: LocalSyncState::resolve(is_clean, ahead, behind),
        }
    }

    fn require_attached(&self, path: &Path) -> GitResult<()> {
        let head = self.git(path, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        if head.trim() == "HEAD" {
            return Err(LocalGitError::DetachedHead);
        }
        Ok(())
    }

    fn require_upstream(&self, path: &Path) -> GitResult<()> {
        match self.upstream(path) {
            Some(_) => Ok(()),
            None => Err(LocalGitError::MissingUpstream),
        }
    }

    /// Fetch, then fast-forward when only behind or push when only ahead.
    ///
    /// Diverged clones are fetched and reported but left untouched. Uncommitted
    /// changes block the fast-forward only; committed work is still pushed.
    pub fn smart_sync(&self, path: &Path) -> GitResult<SmartSyncResult> {
        self.require_attached(path)?;
        self.require_upstream(path)?;

        self.git(path, &["fetch", "--quiet"])?;
        let mut result = SmartSyncResult {
            did_fetch: true,
            did_pull: false,
            did_push: false,
            state: LocalSyncState::Unknown,
        };

        match self.ahead_behind(path) {
            (Some(0), Some(behind)) if behind > 0 => {
                if self.is_clean(path) {
                    self.git(path, &["merge", "--ff-only", UPSTREAM])?;
                    result.did_pull = true;
                } else {
                    log::debug!("Not fast-forwarding dirty clone {}", path.display());
                }
            }
            (Some(ahead), Some(0)) if ahead > 0 => {
                self.git(path, &["push"])?;
                result.did_push = true;
            }
            counts => log::debug!("No sync action for {} ({:?})", path.display(), counts),
        }

        let (ahead, behind) = self.ahead_behind(path);
        result.state = LocalSyncState::resolve(self.is_clean(path), ahead, behind);
        Ok(result)
    }

    /// Rebase the current branch onto its freshly fetched upstream.
    pub fn rebase_onto_upstream(&self, path: &Path) -> GitResult<()> {
        if !self.is_clean(path) {
            return Err(LocalGitError::DirtyWorkingTree);
        }
        self.require_upstream(path)?;
        self.git(path, &["fetch", "--quiet"])?;

        if let Err(e) = self.git(path, &["rebase", UPSTREAM]) {
            // Leave the clone as it was rather than mid-rebase.
            let _ = self.git(path, &["rebase", "--abort"]);
            return Err(e);
        }
        Ok(())
    }

    /// Discard local commits and changes, matching the upstream tip.
    pub fn hard_reset_to_upstream(&self, path: &Path) -> GitResult<()> {
        self.require_upstream(path)?;
        self.git(path, &["fetch", "--quiet"])?;
        self.git(path, &["reset", "--hard", UPSTREAM])?;
        Ok(())
    }

    pub fn create_branch(&self, path: &Path, name: &str) -> GitResult<()> {
        self.git(path, &["switch", "-c", name])?;
        Ok(())
    }

    /// Add a worktree at `worktree_path` on a new branch `branch`.
    pub fn create_worktree(&self, path: &Path, worktree_path: &Path, branch: &str) -> GitResult<()> {
        let target = worktree_path.to_string_lossy();
        self.git(path, &["worktree", "add", "-b", branch, target.as_ref()])?;
        Ok(())
    }

    /// Clone `remote_url` into `destination`, which must be absent or empty.
    ///
    /// A relative `destination` is resolved against the process working directory.
    pub fn clone_repo(&self, remote_url: &str, destination: &Path) -> GitResult<()> {
        let target = std::path::absolute(destination).map_err(|e| LocalGitError::CommandFailed {
            output: String::new(),
            error: format!("cannot resolve {}: {}", destination.display(), e),
        })?;
        if !is_empty_or_missing(&target) {
            return Err(LocalGitError::DestinationNotEmpty(destination.to_path_buf()));
        }
        let cwd = target
            .ancestors()
            .skip(1)
            .find(|dir| dir.is_dir())
            .unwrap_or_else(|| Path::new("/"));
        let target = target.to_string_lossy();
        self.git(cwd, &["clone", remote_url, target.as_ref()])?;
        Ok(())
    }

    /// Local branches; unparseable lines are skipped.
    pub fn branches(&self, path: &Path) -> GitResult<Vec<LocalBranch>> {
        let output = self.git(
            path,
            &[
                "for-each-ref",
                "--format=%(HEAD)%09%(refname:short)%09%(upstream:short)",
                "refs/heads",
            ],
        )?;
        Ok(parse_branches(&output))
    }

    /// All worktrees of the repository containing `path`.
    pub fn worktrees(&self, path: &Path) -> GitResult<Vec<LocalWorktree>> {
        let output = self.git(path, &["worktree", "list", "--porcelain"])?;
        let toplevel = self
            .git(path, &["rev-parse", "--show-toplevel"])
            .map(|raw| PathBuf::from(raw.trim()))
            .unwrap_or_else(|_| path.to_path_buf());
        let current = normalize(&toplevel);

        let mut worktrees = parse_worktrees(&output);
        for worktree in &mut worktrees {
            worktree.is_current = normalize(&worktree.path) == current;
        }
        Ok(worktrees)
    }
}

fn is_empty_or_missing(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => !path.exists(),
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parse_branches(output: &str) -> Vec<LocalBranch> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let head = fields.next()?;
            let name = fields.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let upstream = fields
                .next()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string);
            Some(LocalBranch {
                name: name.to_string(),
                is_current: head.trim() == "*",
                upstream,
            })
        })
        .collect()
}

fn parse_worktrees(output: &str) -> Vec<LocalWorktree> {
    let mut worktrees = Vec::new();
    let mut current: Option<LocalWorktree> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            worktrees.extend(current.take());
            current = Some(LocalWorktree {
                path: PathBuf::from(path),
                head: None,
                branch: None,
                is_detached: false,
                is_current: false,
            });
            continue;
        }
        let Some(worktree) = current.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            worktree.head = Some(head.to_string());
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let short = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            worktree.branch = Some(short.to_string());
        } else if line == "detached" {
            worktree.is_detached = true;
        }
    }
    worktrees.extend(current);
    worktrees
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted executor keyed by the joined argument list.
    #[derive(Default)]
    struct FakeExecutor {
        responses: HashMap<String, GitResult<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        fn ok(mut self, args: &str, output: &str) -> Self {
            self.responses.insert(args.to_string(), Ok(output.to_string()));
            self
        }

        fn fail(mut self, args: &str) -> Self {
            self.responses.insert(
                args.to_string(),
                Err(LocalGitError::CommandFailed {
                    output: String::new(),
                    error: format!("fatal: {args}"),
                }),
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl VcsExecutor for FakeExecutor {
        fn run(&self, args: &[&str], _cwd: &Path) -> GitResult<String> {
            let key = args.join(" ");
            self.calls.lock().unwrap().push(key.clone());
            self.responses
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    const HEAD: &str = "rev-parse --abbrev-ref HEAD";
    const UPSTREAM_NAME: &str = "rev-parse --abbrev-ref --symbolic-full-name @{u}";
    const COUNTS: &str = "rev-list --left-right --count @{u}...HEAD";
    const STATUS: &str = "status --porcelain";
    const REMOTE: &str = "remote get-url origin";

    fn path() -> &'static Path {
        Path::new("/work/RepoBar")
    }

    #[test]
    fn test_status_from_git_output() {
        let git = FakeExecutor::default()
            .ok(HEAD, "main\n")
            .ok(STATUS, "")
            .ok(COUNTS, "3\t0\n")
            .ok(REMOTE, "git@github.com:steipete/RepoBar.git\n");
        let status = LocalGitService::with_executor(git).status(path());

        assert_eq!(status.branch, "main");
        assert_eq!(status.full_name.as_deref(), Some("steipete/RepoBar"));
        assert_eq!(status.behind_count, Some(3));
        assert_eq!(status.ahead_count, Some(0));
        assert_eq!(status.sync_state, LocalSyncState::Behind);
        assert!(status.can_auto_sync());
    }

    #[test]
    fn test_status_without_upstream_or_remote() {
        let git = FakeExecutor::default()
            .ok(HEAD, "HEAD\n")
            .ok(STATUS, "")
            .fail(COUNTS)
            .fail(REMOTE);
        let status = LocalGitService::with_executor(git).status(path());

        assert_eq!(status.branch, DETACHED_BRANCH);
        assert_eq!(status.name, "RepoBar");
        assert!(status.full_name.is_none());
        assert_eq!(status.sync_state, LocalSyncState::Unknown);
        assert_eq!(status.sync_detail(), "No upstream");
    }

    #[test]
    fn test_unreadable_status_counts_as_dirty() {
        let git = FakeExecutor::default().fail(STATUS).fail(HEAD);
        let service = LocalGitService::with_executor(git);
        assert!(!service.is_clean(path()));
        assert_eq!(service.current_branch(path()), "unknown");
    }

    #[test]
    fn test_smart_sync_detached_checked_before_upstream() {
        let git = FakeExecutor::default().ok(HEAD, "HEAD\n").fail(UPSTREAM_NAME);
        let err = LocalGitService::with_executor(git).smart_sync(path()).unwrap_err();
        assert_eq!(err, LocalGitError::DetachedHead);
    }

    #[test]
    fn test_smart_sync_missing_upstream_does_not_fetch() {
        let git = FakeExecutor::default().ok(HEAD, "main\n").fail(UPSTREAM_NAME);
        let service = LocalGitService::with_executor(git);
        let err = service.smart_sync(path()).unwrap_err();

        assert_eq!(err, LocalGitError::MissingUpstream);
        assert!(!service.executor.calls().iter().any(|c| c.starts_with("fetch")));
    }

    #[test]
    fn test_smart_sync_diverged_takes_no_action() {
        let git = FakeExecutor::default()
            .ok(HEAD, "main\n")
            .ok(UPSTREAM_NAME, "origin/main\n")
            .ok(STATUS, "")
            .ok(COUNTS, "2\t1\n");
        let service = LocalGitService::with_executor(git);
        let result = service.smart_sync(path()).unwrap();

        assert!(result.did_fetch);
        assert!(!result.did_pull);
        assert!(!result.did_push);
        assert_eq!(result.state, LocalSyncState::Diverged);
        let calls = service.executor.calls();
        assert!(!calls.iter().any(|c| c.starts_with("merge") || c == "push"));
    }

    #[test]
    fn test_smart_sync_dirty_tree_blocks_pull_but_not_push() {
        let behind = FakeExecutor::default()
            .ok(HEAD, "main\n")
            .ok(UPSTREAM_NAME, "origin/main\n")
            .ok(STATUS, " M README.md\n")
            .ok(COUNTS, "2\t0\n");
        let service = LocalGitService::with_executor(behind);
        let result = service.smart_sync(path()).unwrap();
        assert!(!result.did_pull);
        assert_eq!(result.state, LocalSyncState::Dirty);
        assert!(!service.executor.calls().iter().any(|c| c.starts_with("merge")));

        let ahead = FakeExecutor::default()
            .ok(HEAD, "main\n")
            .ok(UPSTREAM_NAME, "origin/main\n")
            .ok(STATUS, " M README.md\n")
            .ok(COUNTS, "0\t3\n");
        let service = LocalGitService::with_executor(ahead);
        let result = service.smart_sync(path()).unwrap();
        assert!(result.did_push);
        assert!(service.executor.calls().contains(&"push".to_string()));
    }

    #[test]
    fn test_rebase_refuses_dirty_tree() {
        let git = FakeExecutor::default().ok(STATUS, " M README.md\n");
        let service = LocalGitService::with_executor(git);
        assert_eq!(
            service.rebase_onto_upstream(path()).unwrap_err(),
            LocalGitError::DirtyWorkingTree
        );
        assert_eq!(service.executor.calls(), vec![STATUS.to_string()]);
    }

    #[test]
    fn test_failed_rebase_is_aborted() {
        let git = FakeExecutor::default()
            .ok(STATUS, "")
            .ok(UPSTREAM_NAME, "origin/main\n")
            .fail("rebase @{u}");
        let service = LocalGitService::with_executor(git);

        let err = service.rebase_onto_upstream(path()).unwrap_err();
        assert!(matches!(err, LocalGitError::CommandFailed { .. }));
        assert_eq!(service.executor.calls().last().unwrap(), "rebase --abort");
    }

    #[test]
    fn test_clone_refuses_non_empty_destination() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file.txt"), "x").unwrap();
        let service = LocalGitService::with_executor(FakeExecutor::default());

        let err = service
            .clone_repo("https://github.com/steipete/RepoBar.git", temp_dir.path())
            .unwrap_err();
        assert_eq!(err, LocalGitError::DestinationNotEmpty(temp_dir.path().to_path_buf()));
        assert!(service.executor.calls().is_empty());
    }

    #[test]
    fn test_clone_passes_absolute_target_for_relative_destination() {
        let service = LocalGitService::with_executor(FakeExecutor::default());
        let relative = Path::new("repobar-missing-parent/projects/dest");

        service
            .clone_repo("https://github.com/steipete/RepoBar.git", relative)
            .unwrap();

        let expected = std::env::current_dir().unwrap().join(relative);
        assert_eq!(
            service.executor.calls(),
            vec![format!(
                "clone https://github.com/steipete/RepoBar.git {}",
                expected.display()
            )]
        );
    }

    #[test]
    fn test_parse_branches() {
        let output = "*\tmain\torigin/main\n \tfeature/x\t\ngarbage\n";
        let branches = parse_branches(output);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name, "main");
        assert!(branches[0].is_current);
        assert_eq!(branches[0].upstream.as_deref(), Some("origin/main"));
        assert!(!branches[1].is_current);
        assert!(branches[1].upstream.is_none());
    }

    #[test]
    fn test_parse_worktrees() {
        let output = "worktree /work/repo\nHEAD 1111\nbranch refs/heads/main\n\n\
                      worktree /work/detached\nHEAD 2222\ndetached\n\n";
        let worktrees = parse_worktrees(output);
        assert_eq!(worktrees.len(), 2);
        assert_eq!(worktrees[0].branch.as_deref(), Some("main"));
        assert!(!worktrees[0].is_detached);
        assert_eq!(worktrees[1].path, PathBuf::from("/work/detached"));
        assert!(worktrees[1].branch.is_none());
        assert!(worktrees[1].is_detached);
        assert!(parse_worktrees("not porcelain output").is_empty());
    }
}
