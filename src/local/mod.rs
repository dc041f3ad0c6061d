// Local clones.
// Git execution, status resolution, guarded mutations, and root scanning.

pub mod executor;
pub mod manager;
pub mod service;
pub mod status;

pub use executor::{GitCommand, VcsExecutor};
pub use manager::{LocalRepoManager, SyncNotification, discover};
pub use service::{LocalBranch, LocalGitService, LocalWorktree, SmartSyncResult};
pub use status::{DETACHED_BRANCH, GitRemote, LocalRepoIndex, LocalRepoStatus, LocalSyncState};
