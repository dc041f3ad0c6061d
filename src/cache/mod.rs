// Cache module.
// Freshness-tracked caches for repository details and recent-item lists, plus endpoint backoff.

pub mod backoff;
pub mod paths;
pub mod recent;
pub mod repo_detail;
pub mod store;

pub use backoff::BackoffTracker;
pub use recent::{ListTask, RecentListCache};
pub use repo_detail::{
    FieldCacheState, RepoDetailCache, RepoDetailCachePolicy, RepoDetailCacheState,
    RepoDetailCacheStore, RepoDetailStore,
};
pub use store::{CachedData, is_fresh};
