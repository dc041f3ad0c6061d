// Local project scanning.
// Discovers clones under a root, builds their status, and fast-forwards eligible ones.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedSender;
use walkdir::WalkDir;

use crate::config::LocalProjectsSettings;

use super::executor::{GitCommand, VcsExecutor};
use super::service::LocalGitService;
use super::status::{LocalRepoIndex, LocalRepoStatus};

/// Sent after a clone was synced unattended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNotification {
    pub status: LocalRepoStatus,
    pub message: String,
}

impl SyncNotification {
    fn synced(status: LocalRepoStatus) -> Self {
        let message = format!("Synced {} ({})", status.display_name(), status.branch);
        Self { status, message }
    }
}

pub struct LocalRepoManager<E: VcsExecutor = GitCommand> {
    git: LocalGitService<E>,
    notifier: Option<UnboundedSender<SyncNotification>>,
}

impl LocalRepoManager<GitCommand> {
    pub fn new() -> Self {
        Self::with_service(LocalGitService::new())
    }
}

impl Default for LocalRepoManager<GitCommand> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: VcsExecutor> LocalRepoManager<E> {
    pub fn with_service(git: LocalGitService<E>) -> Self {
        Self {
            git,
            notifier: None,
        }
    }

    /// Deliver auto-sync notifications on `sender`.
    pub fn with_notifier(mut self, sender: UnboundedSender<SyncNotification>) -> Self {
        self.notifier = Some(sender);
        self
    }

    pub fn git(&self) -> &LocalGitService<E> {
        &self.git
    }

    /// Scan the configured root and return an index of every clone found.
    ///
    /// A missing, empty, or non-directory root yields an empty index. Clones
    /// that can be fast-forwarded are synced when auto-sync is enabled.
    pub fn snapshot(&self, settings: &LocalProjectsSettings) -> LocalRepoIndex {
        let Some(root) = settings.root_path.as_deref() else {
            return LocalRepoIndex::empty();
        };
        if root.as_os_str().is_empty() || !root.is_dir() {
            log::debug!("Local projects root {} is not a directory", root.display());
            return LocalRepoIndex::empty();
        }

        let clones = discover(root, settings.max_depth);
        log::info!("Found {} local clones under {}", clones.len(), root.display());

        let statuses = clones
            .iter()
            .map(|path| self.status_with_auto_sync(path, settings.auto_sync_enabled))
            .collect();
        LocalRepoIndex::new(statuses)
    }

    fn status_with_auto_sync(&self, path: &Path, auto_sync_enabled: bool) -> LocalRepoStatus {
        let status = self.git.status(path);
        if !auto_sync_enabled || !status.can_auto_sync() {
            return status;
        }

        match self.git.smart_sync(path) {
            Ok(result) => {
                log::info!(
                    "Auto-synced {} (pulled: {}, state: {:?})",
                    status.display_name(),
                    result.did_pull,
                    result.state
                );
                let refreshed = self.git.status(path);
                self.notify(SyncNotification::synced(refreshed.clone()));
                refreshed
            }
            Err(e) => {
                log::warn!("Auto-sync of {} failed: {}", status.display_name(), e);
                status
            }
        }
    }

    fn notify(&self, notification: SyncNotification) {
        if let Some(sender) = &self.notifier {
            // Nobody listening is fine.
            let _ = sender.send(notification);
        }
    }
}

/// Directories under `root` (inclusive) holding a `.git` entry, at most `max_depth` levels down.
///
/// Hidden directories are skipped, symlinks are not followed, and a found
/// clone is not searched for nested clones.
pub fn discover(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut clones = Vec::new();
    let mut walker = WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().join(".git").exists() {
            clones.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    clones
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
