// GitHub API module.
// Provides the client, the RepoApi seam, and types for the GitHub REST and GraphQL APIs.

pub mod api;
pub mod client;
pub mod endpoints;
pub mod types;

pub use api::RepoApi;
pub use client::GitHubClient;
pub use types::*;
