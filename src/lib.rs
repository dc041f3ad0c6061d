// RepoBar engine.
// Cached GitHub repository state and local clone synchronization.

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod local;
pub mod sync;

pub use config::Config;
pub use error::{LocalGitError, RepoBarError, Result};
