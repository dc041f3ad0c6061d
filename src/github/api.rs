// Repository API abstraction.
// The seam between the caches and the network; tests substitute their own implementation.

use async_trait::async_trait;

use crate::error::Result;

use super::client::GitHubClient;
use super::types::{
    ActivitySnapshot, CiStatusDetails, HeatmapCell, Release, RepoBranchSummary, RepoCommitList,
    RepoContributorSummary, RepoDiscussionSummary, RepoIssueSummary, RepoItem,
    RepoPullRequestSummary, RepoTagSummary, TrafficStats, WorkflowRun,
};

/// Remote operations needed to assemble repository snapshots and recent lists.
#[async_trait]
pub trait RepoApi: Send + Sync {
    /// Base URL identifying the API server, used to partition caches.
    fn api_host(&self) -> String;

    async fn repo_details(&self, owner: &str, name: &str) -> Result<RepoItem>;
    async fn open_pull_request_count(&self, owner: &str, name: &str) -> Result<u64>;
    async fn ci_status(&self, owner: &str, name: &str) -> Result<CiStatusDetails>;
    async fn recent_activity(&self, owner: &str, name: &str, limit: usize)
    -> Result<ActivitySnapshot>;
    async fn traffic_stats(&self, owner: &str, name: &str) -> Result<Option<TrafficStats>>;
    async fn commit_heatmap(&self, owner: &str, name: &str) -> Result<Vec<HeatmapCell>>;
    async fn latest_release_any(&self, owner: &str, name: &str) -> Result<Option<Release>>;

    async fn recent_issues(&self, owner: &str, name: &str, limit: usize)
    -> Result<Vec<RepoIssueSummary>>;
    async fn recent_pull_requests(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoPullRequestSummary>>;
    async fn recent_releases(&self, owner: &str, name: &str, limit: usize) -> Result<Vec<Release>>;
    async fn recent_workflow_runs(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<WorkflowRun>>;
    async fn recent_commits(&self, owner: &str, name: &str, limit: usize) -> Result<RepoCommitList>;
    async fn recent_discussions(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoDiscussionSummary>>;
    async fn recent_tags(&self, owner: &str, name: &str, limit: usize)
    -> Result<Vec<RepoTagSummary>>;
    async fn recent_branches(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoBranchSummary>>;
    async fn top_contributors(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoContributorSummary>>;
}

#[async_trait]
impl RepoApi for GitHubClient {
    fn api_host(&self) -> String {
        self.api_base().to_string()
    }

    async fn repo_details(&self, owner: &str, name: &str) -> Result<RepoItem> {
        self.get_repo(owner, name).await
    }

    async fn open_pull_request_count(&self, owner: &str, name: &str) -> Result<u64> {
        self.get_open_pull_request_count(owner, name).await
    }

    async fn ci_status(&self, owner: &str, name: &str) -> Result<CiStatusDetails> {
        self.get_ci_status(owner, name).await
    }

    async fn recent_activity(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<ActivitySnapshot> {
        self.get_recent_activity(owner, name, limit).await
    }

    async fn traffic_stats(&self, owner: &str, name: &str) -> Result<Option<TrafficStats>> {
        self.get_traffic_stats(owner, name).await
    }

    async fn commit_heatmap(&self, owner: &str, name: &str) -> Result<Vec<HeatmapCell>> {
        self.get_commit_heatmap(owner, name).await
    }

    async fn latest_release_any(&self, owner: &str, name: &str) -> Result<Option<Release>> {
        self.get_latest_release_any(owner, name).await
    }

    async fn recent_issues(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoIssueSummary>> {
        self.get_recent_issues(owner, name, limit).await
    }

    async fn recent_pull_requests(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoPullRequestSummary>> {
        self.get_recent_pull_requests(owner, name, limit).await
    }

    async fn recent_releases(&self, owner: &str, name: &str, limit: usize) -> Result<Vec<Release>> {
        self.get_releases(owner, name, limit).await
    }

    async fn recent_workflow_runs(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<WorkflowRun>> {
        self.get_workflow_runs(owner, name, limit).await
    }

    async fn recent_commits(&self, owner: &str, name: &str, limit: usize) -> Result<RepoCommitList> {
        self.get_recent_commits(owner, name, limit).await
    }

    async fn recent_discussions(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoDiscussionSummary>> {
        self.get_recent_discussions(owner, name, limit).await
    }

    async fn recent_tags(&self, owner: &str, name: &str, limit: usize) -> Result<Vec<RepoTagSummary>> {
        self.get_tags(owner, name, limit).await
    }

    async fn recent_branches(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoBranchSummary>> {
        self.get_branches(owner, name, limit).await
    }

    async fn top_contributors(
        &self,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RepoContributorSummary>> {
        self.get_contributors(owner, name, limit).await
    }
}
