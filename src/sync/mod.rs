// Remote synchronization.
// Repository snapshots assembled from the detail cache, and the recent-item lists.

pub mod coordinator;
pub mod recent;
pub mod repository;

#[cfg(test)]
pub(crate) mod fake;

pub use coordinator::{ACTIVITY_LIMIT, RepoDetailCoordinator, RepoErrorAccumulator};
pub use recent::{RecentItems, RecentMenuDescriptor, RecentMenuKind, RecentMenuService};
pub use repository::Repository;
