// In-memory RepoApi used by the sync tests.
// Counts calls per method and can be told to fail or hang on any of them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{RepoBarError, Result};
use crate::github::{
    ActivityEvent, ActivitySnapshot, CiStatus, CiStatusDetails, CommitRef, HeatmapCell, Owner,
    Release, RepoApi, RepoBranchSummary, RepoCommitList, RepoCommitSummary,
    RepoContributorSummary, RepoDiscussionSummary, RepoIssueSummary, RepoItem,
    RepoPullRequestSummary, RepoTagSummary, TrafficStats, WorkflowRun,
};

#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Other(&'static str),
    RateLimited(DateTime<Utc>),
    Unauthorized,
    /// Never completes in any reasonable test timeout.
    Hang,
}

pub struct FakeApi {
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, FakeFailure>>,
    delay: Mutex<Option<Duration>>,
    has_discussions: Mutex<Option<bool>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            has_discussions: Mutex::new(Some(true)),
        }
    }

    pub fn fail(&self, method: &'static str, failure: FakeFailure) {
        self.failures.lock().unwrap().insert(method, failure);
    }

    /// Make every successful call wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Discussions flag reported by `repo_details`.
    pub fn set_has_discussions(&self, value: Option<bool>) {
        *self.has_discussions.lock().unwrap() = value;
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn repo_item(&self) -> RepoItem {
        RepoItem {
            id: 1,
            name: "RepoBar".into(),
            full_name: "steipete/RepoBar".into(),
            owner: Owner {
                id: 2,
                login: "steipete".into(),
                avatar_url: None,
            },
            private: false,
            fork: false,
            archived: false,
            description: Some("Menu bar GitHub status".into()),
            html_url: "https://github.com/steipete/RepoBar".into(),
            stargazers_count: 1200,
            forks_count: 40,
            open_issues_count: 10,
            pushed_at: Some(now()),
            updated_at: Some(now()),
            has_discussions: *self.has_discussions.lock().unwrap(),
        }
    }

    async fn enter(&self, method: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
        let failure = self.failures.lock().unwrap().get(method).copied();
        match failure {
            Some(FakeFailure::Other(message)) => Err(RepoBarError::Other(message.to_string())),
            Some(FakeFailure::RateLimited(reset_at)) => Err(RepoBarError::RateLimited { reset_at }),
            Some(FakeFailure::Unauthorized) => Err(RepoBarError::Unauthorized),
            Some(FakeFailure::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RepoBarError::Other("hang elapsed".into()))
            }
            None => {
                let delay = *self.delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(())
            }
        }
    }
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_714_557_600, 0).unwrap_or_default()
}

fn release(tag: &str) -> Release {
    Release {
        name: Some(format!("RepoBar {tag}")),
        tag_name: tag.into(),
        html_url: format!("https://github.com/steipete/RepoBar/releases/tag/{tag}"),
        published_at: Some(now()),
        prerelease: false,
        draft: false,
        author: None,
        assets: Vec::new(),
    }
}

#[async_trait]
impl RepoApi for FakeApi {
    fn api_host(&self) -> String {
        "https://api.github.com".into()
    }

    async fn repo_details(&self, _owner: &str, _name: &str) -> Result<RepoItem> {
        self.enter("repo_details").await?;
        Ok(self.repo_item())
    }

    async fn open_pull_request_count(&self, _owner: &str, _name: &str) -> Result<u64> {
        self.enter("open_pull_request_count").await?;
        Ok(3)
    }

    async fn ci_status(&self, _owner: &str, _name: &str) -> Result<CiStatusDetails> {
        self.enter("ci_status").await?;
        Ok(CiStatusDetails {
            status: CiStatus::Passing,
            run_count: Some(41),
        })
    }

    async fn recent_activity(
        &self,
        _owner: &str,
        _name: &str,
        limit: usize,
    ) -> Result<ActivitySnapshot> {
        self.enter("recent_activity").await?;
        let events: Vec<ActivityEvent> = (0..limit.min(3))
            .map(|i| ActivityEvent {
                title: format!("pushed {} commits to main", i + 1),
                actor: "steipete".into(),
                date: now(),
                url: None,
                event_type: "PushEvent".into(),
            })
            .collect();
        Ok(ActivitySnapshot {
            latest: events.first().cloned(),
            events,
        })
    }

    async fn traffic_stats(&self, _owner: &str, _name: &str) -> Result<Option<TrafficStats>> {
        self.enter("traffic_stats").await?;
        Ok(Some(TrafficStats {
            views: 300,
            unique_visitors: 120,
            clones: 40,
            unique_cloners: 12,
        }))
    }

    async fn commit_heatmap(&self, _owner: &str, _name: &str) -> Result<Vec<HeatmapCell>> {
        self.enter("commit_heatmap").await?;
        Ok(vec![HeatmapCell {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default(),
            count: 4,
        }])
    }

    async fn latest_release_any(&self, _owner: &str, _name: &str) -> Result<Option<Release>> {
        self.enter("latest_release_any").await?;
        Ok(Some(release("v1.0.0")))
    }

    async fn recent_issues(
        &self,
        _owner: &str,
        _name: &str,
        limit: usize,
    ) -> Result<Vec<RepoIssueSummary>> {
        self.enter("recent_issues").await?;
        Ok((1..=limit.min(2) as u64)
            .map(|number| RepoIssueSummary {
                number,
                title: format!("Issue {number}"),
                html_url: format!("https://github.com/steipete/RepoBar/issues/{number}"),
                updated_at: now(),
                user: None,
                comments: 0,
                labels: Vec::new(),
                pull_request: None,
            })
            .collect())
    }

    async fn recent_pull_requests(
        &self,
        _owner: &str,
        _name: &str,
        _limit: usize,
    ) -> Result<Vec<RepoPullRequestSummary>> {
        self.enter("recent_pull_requests").await?;
        Ok(Vec::new())
    }

    async fn recent_releases(&self, _owner: &str, _name: &str, _limit: usize) -> Result<Vec<Release>> {
        self.enter("recent_releases").await?;
        Ok(vec![release("v1.0.0"), release("v0.9.0")])
    }

    async fn recent_workflow_runs(
        &self,
        _owner: &str,
        _name: &str,
        _limit: usize,
    ) -> Result<Vec<WorkflowRun>> {
        self.enter("recent_workflow_runs").await?;
        Ok(Vec::new())
    }

    async fn recent_commits(&self, _owner: &str, _name: &str, limit: usize) -> Result<RepoCommitList> {
        self.enter("recent_commits").await?;
        let items = (0..limit.min(3))
            .map(|i| RepoCommitSummary {
                sha: format!("{i:040x}"),
                message: format!("Commit {i}"),
                url: String::new(),
                authored_at: Some(now()),
                author_name: Some("Peter".into()),
                author_login: Some("steipete".into()),
            })
            .collect();
        Ok(RepoCommitList {
            items,
            total_count: Some(128),
        })
    }

    async fn recent_discussions(
        &self,
        _owner: &str,
        _name: &str,
        _limit: usize,
    ) -> Result<Vec<RepoDiscussionSummary>> {
        self.enter("recent_discussions").await?;
        Ok(Vec::new())
    }

    async fn recent_tags(&self, _owner: &str, _name: &str, _limit: usize) -> Result<Vec<RepoTagSummary>> {
        self.enter("recent_tags").await?;
        Ok(vec![RepoTagSummary {
            name: "v1.0.0".into(),
            commit: CommitRef { sha: "abc".into() },
        }])
    }

    async fn recent_branches(
        &self,
        _owner: &str,
        _name: &str,
        _limit: usize,
    ) -> Result<Vec<RepoBranchSummary>> {
        self.enter("recent_branches").await?;
        Ok(vec![RepoBranchSummary {
            name: "main".into(),
            protected: true,
            commit: CommitRef { sha: "abc".into() },
        }])
    }

    async fn top_contributors(
        &self,
        _owner: &str,
        _name: &str,
        _limit: usize,
    ) -> Result<Vec<RepoContributorSummary>> {
        self.enter("top_contributors").await?;
        Ok(vec![RepoContributorSummary {
            login: "steipete".into(),
            avatar_url: None,
            contributions: 900,
        }])
    }
}
