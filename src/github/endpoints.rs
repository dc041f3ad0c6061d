// GitHub API endpoint functions.
// Provides typed methods for fetching data from the GitHub REST and GraphQL APIs.

use chrono::{DateTime, Days, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{RepoBarError, Result};

use super::client::GitHubClient;
use super::types::{
    ActivityEvent, ActivitySnapshot, CiStatus, CiStatusDetails, HeatmapCell, Release,
    RepoBranchSummary, RepoCommitList, RepoCommitSummary, RepoContributorSummary,
    RepoDiscussionSummary, RepoIssueSummary, RepoItem, RepoPullRequestSummary, RepoTagSummary,
    TrafficStats, WorkflowRun,
};

/// Events that say little about a repository's progress.
const NOISE_EVENTS: &[&str] = &["WatchEvent", "ForkEvent", "MemberEvent", "PublicEvent"];

/// Response wrapper for workflow runs list.
#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    total_count: u64,
    workflow_runs: Vec<WorkflowRun>,
}

/// Response wrapper for the search API; only the count is used.
#[derive(Debug, Deserialize)]
struct SearchCountResponse {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct TrafficCount {
    count: u64,
    uniques: u64,
}

#[derive(Debug, Deserialize)]
struct CommitActivityWeek {
    week: i64,
    days: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct RawActor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    actor: RawActor,
    created_at: DateTime<Utc>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawCommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawCommitDetail {
    message: String,
    author: Option<RawCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    sha: String,
    html_url: String,
    commit: RawCommitDetail,
    author: Option<RawActor>,
}

impl From<RawCommit> for RepoCommitSummary {
    fn from(raw: RawCommit) -> Self {
        let (author_name, authored_at) = match raw.commit.author {
            Some(author) => (author.name, author.date),
            None => (None, None),
        };
        Self {
            sha: raw.sha,
            message: raw.commit.message.lines().next().unwrap_or_default().to_string(),
            url: raw.html_url,
            authored_at,
            author_name,
            author_login: raw.author.map(|a| a.login),
        }
    }
}

const DISCUSSIONS_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!) {
  repository(owner: $owner, name: $name) {
    discussions(first: $first, orderBy: {field: UPDATED_AT, direction: DESC}) {
      nodes {
        number
        title
        url
        updatedAt
        author { login }
        comments { totalCount }
        category { name }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscussionNode {
    number: u64,
    title: String,
    url: String,
    updated_at: DateTime<Utc>,
    author: Option<RawActor>,
    comments: DiscussionComments,
    category: Option<DiscussionCategory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscussionComments {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct DiscussionCategory {
    name: String,
}

fn list_params(limit: usize) -> [(&'static str, String); 1] {
    [("per_page", limit.clamp(1, 100).to_string())]
}

impl GitHubClient {
    /// Get a specific repository.
    pub async fn get_repo(&self, owner: &str, repo: &str) -> Result<RepoItem> {
        let response = self.get(&format!("/repos/{}/{}", owner, repo)).await?;
        Ok(response.json().await?)
    }

    /// Count open pull requests via the search API.
    pub async fn get_open_pull_request_count(&self, owner: &str, repo: &str) -> Result<u64> {
        let query = format!("repo:{}/{} type:pr state:open", owner, repo);
        let params = [("q", query.as_str()), ("per_page", "1")];
        let response = self.get_with_params("/search/issues", &params).await?;
        let wrapper: SearchCountResponse = response.json().await?;
        Ok(wrapper.total_count)
    }

    /// Summarise the newest workflow run.
    pub async fn get_ci_status(&self, owner: &str, repo: &str) -> Result<CiStatusDetails> {
        let response = self
            .get_with_params(
                &format!("/repos/{}/{}/actions/runs", owner, repo),
                &[("per_page", "1")],
            )
            .await?;
        let wrapper: WorkflowRunsResponse = response.json().await?;
        let status = wrapper
            .workflow_runs
            .first()
            .map(CiStatus::from_run)
            .unwrap_or_default();
        Ok(CiStatusDetails {
            status,
            run_count: Some(wrapper.total_count),
        })
    }

    /// Recent repository events, newest first.
    pub async fn get_recent_activity(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<ActivitySnapshot> {
        let response = self
            .get_with_params(
                &format!("/repos/{}/{}/events", owner, repo),
                &list_params(limit),
            )
            .await?;
        let raw: Vec<RawEvent> = response.json().await?;
        let events: Vec<ActivityEvent> = raw.into_iter().take(limit).map(activity_event).collect();
        let latest = events
            .iter()
            .find(|event| !NOISE_EVENTS.contains(&event.event_type.as_str()))
            .cloned();
        Ok(ActivitySnapshot { events, latest })
    }

    /// Two-week view and clone totals. `None` without push access.
    pub async fn get_traffic_stats(&self, owner: &str, repo: &str) -> Result<Option<TrafficStats>> {
        let views = match self
            .get(&format!("/repos/{}/{}/traffic/views", owner, repo))
            .await
        {
            Ok(response) => response.json::<TrafficCount>().await?,
            Err(RepoBarError::Forbidden(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let clones = match self
            .get(&format!("/repos/{}/{}/traffic/clones", owner, repo))
            .await
        {
            Ok(response) => response.json::<TrafficCount>().await?,
            Err(RepoBarError::Forbidden(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(TrafficStats {
            views: views.count,
            unique_visitors: views.uniques,
            clones: clones.count,
            unique_cloners: clones.uniques,
        }))
    }

    /// Daily commit counts for the last year. Empty while GitHub is still computing stats.
    pub async fn get_commit_heatmap(&self, owner: &str, repo: &str) -> Result<Vec<HeatmapCell>> {
        let response = self
            .get(&format!("/repos/{}/{}/stats/commit_activity", owner, repo))
            .await?;
        if response.status() == StatusCode::ACCEPTED || response.status() == StatusCode::NO_CONTENT
        {
            log::debug!("Commit activity for {}/{} not ready yet", owner, repo);
            return Ok(Vec::new());
        }
        let weeks: Vec<CommitActivityWeek> = response.json().await?;
        Ok(heatmap_cells(&weeks))
    }

    /// Newest non-draft release, prereleases included.
    pub async fn get_latest_release_any(&self, owner: &str, repo: &str) -> Result<Option<Release>> {
        let releases = self.get_releases(owner, repo, 20).await?;
        Ok(releases.into_iter().next())
    }

    /// Non-draft releases, newest first.
    pub async fn get_releases(&self, owner: &str, repo: &str, limit: usize) -> Result<Vec<Release>> {
        let response = self
            .get_with_params(
                &format!("/repos/{}/{}/releases", owner, repo),
                &list_params(limit),
            )
            .await?;
        let releases: Vec<Release> = response.json().await?;
        Ok(releases.into_iter().filter(|r| !r.draft).collect())
    }

    /// Open issues (pull requests excluded), most recently updated first.
    pub async fn get_recent_issues(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<RepoIssueSummary>> {
        let per_page = limit.clamp(1, 100).to_string();
        let params = [
            ("state", "open"),
            ("sort", "updated"),
            ("direction", "desc"),
            ("per_page", per_page.as_str()),
        ];
        let response = self
            .get_with_params(&format!("/repos/{}/{}/issues", owner, repo), &params)
            .await?;
        let issues: Vec<RepoIssueSummary> = response.json().await?;
        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .take(limit)
            .collect())
    }

    /// Open pull requests, most recently updated first.
    pub async fn get_recent_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<RepoPullRequestSummary>> {
        let per_page = limit.clamp(1, 100).to_string();
        let params = [
            ("state", "open"),
            ("sort", "updated"),
            ("direction", "desc"),
            ("per_page", per_page.as_str()),
        ];
        let response = self
            .get_with_params(&format!("/repos/{}/{}/pulls", owner, repo), &params)
            .await?;
        Ok(response.json().await?)
    }

    /// Get workflow runs for a repository.
    pub async fn get_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<WorkflowRun>> {
        let response = self
            .get_with_params(
                &format!("/repos/{}/{}/actions/runs", owner, repo),
                &list_params(limit),
            )
            .await?;
        let wrapper: WorkflowRunsResponse = response.json().await?;
        Ok(wrapper.workflow_runs)
    }

    /// Commits on the default branch. The total is only known when everything fits in one page.
    pub async fn get_recent_commits(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<RepoCommitList> {
        let response = self
            .get_with_params(
                &format!("/repos/{}/{}/commits", owner, repo),
                &list_params(limit),
            )
            .await?;
        let paginated = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|link| link.contains("rel=\"next\""));
        let raw: Vec<RawCommit> = response.json().await?;
        let items: Vec<RepoCommitSummary> = raw.into_iter().map(Into::into).collect();
        let total_count = (!paginated).then_some(items.len() as u64);
        Ok(RepoCommitList { items, total_count })
    }

    /// Recently updated discussions via GraphQL.
    pub async fn get_recent_discussions(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<RepoDiscussionSummary>> {
        let variables = serde_json::json!({
            "owner": owner,
            "name": repo,
            "first": limit.clamp(1, 100),
        });
        let data = self.graphql(DISCUSSIONS_QUERY, variables).await?;
        let nodes = data
            .pointer("/repository/discussions/nodes")
            .cloned()
            .ok_or_else(|| RepoBarError::NotFound(format!("{}/{} discussions", owner, repo)))?;
        let nodes: Vec<DiscussionNode> = serde_json::from_value(nodes)?;
        Ok(nodes
            .into_iter()
            .map(|node| RepoDiscussionSummary {
                number: node.number,
                title: node.title,
                url: node.url,
                updated_at: node.updated_at,
                author_login: node.author.map(|a| a.login),
                comment_count: node.comments.total_count,
                category: node.category.map(|c| c.name),
            })
            .collect())
    }

    pub async fn get_tags(&self, owner: &str, repo: &str, limit: usize) -> Result<Vec<RepoTagSummary>> {
        let response = self
            .get_with_params(&format!("/repos/{}/{}/tags", owner, repo), &list_params(limit))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn get_branches(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<RepoBranchSummary>> {
        let response = self
            .get_with_params(
                &format!("/repos/{}/{}/branches", owner, repo),
                &list_params(limit),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Contributors ordered by commit count.
    pub async fn get_contributors(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<RepoContributorSummary>> {
        let response = self
            .get_with_params(
                &format!("/repos/{}/{}/contributors", owner, repo),
                &list_params(limit),
            )
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        Ok(response.json().await?)
    }
}

fn activity_event(raw: RawEvent) -> ActivityEvent {
    let payload = &raw.payload;
    let str_at = |pointer: &str| payload.pointer(pointer).and_then(|v| v.as_str());
    let action = str_at("/action").unwrap_or("updated");

    let (title, url) = match raw.event_type.as_str() {
        "PushEvent" => {
            let branch = str_at("/ref")
                .map(|r| r.trim_start_matches("refs/heads/"))
                .unwrap_or("branch");
            let size = payload.get("size").and_then(|v| v.as_u64()).unwrap_or(0);
            let noun = if size == 1 { "commit" } else { "commits" };
            (format!("pushed {} {} to {}", size, noun, branch), None)
        }
        "IssuesEvent" => (
            format!(
                "{} issue #{}: {}",
                action,
                payload.pointer("/issue/number").and_then(|v| v.as_u64()).unwrap_or(0),
                str_at("/issue/title").unwrap_or_default()
            ),
            str_at("/issue/html_url"),
        ),
        "PullRequestEvent" => (
            format!(
                "{} PR #{}: {}",
                action,
                payload.pointer("/pull_request/number").and_then(|v| v.as_u64()).unwrap_or(0),
                str_at("/pull_request/title").unwrap_or_default()
            ),
            str_at("/pull_request/html_url"),
        ),
        "IssueCommentEvent" => (
            format!(
                "commented on #{}",
                payload.pointer("/issue/number").and_then(|v| v.as_u64()).unwrap_or(0)
            ),
            str_at("/comment/html_url"),
        ),
        "ReleaseEvent" => (
            format!(
                "{} release {}",
                action,
                str_at("/release/tag_name").unwrap_or_default()
            ),
            str_at("/release/html_url"),
        ),
        "CreateEvent" | "DeleteEvent" => {
            let verb = if raw.event_type == "CreateEvent" { "created" } else { "deleted" };
            let ref_type = str_at("/ref_type").unwrap_or("ref");
            let name = str_at("/ref").unwrap_or_default();
            (format!("{} {} {}", verb, ref_type, name).trim_end().to_string(), None)
        }
        "WatchEvent" => ("starred".to_string(), None),
        "ForkEvent" => ("forked".to_string(), str_at("/forkee/html_url")),
        other => (
            other.trim_end_matches("Event").to_lowercase(),
            None,
        ),
    };

    ActivityEvent {
        title,
        actor: raw.actor.login,
        date: raw.created_at,
        url: url.map(str::to_string),
        event_type: raw.event_type,
    }
}

fn heatmap_cells(weeks: &[CommitActivityWeek]) -> Vec<HeatmapCell> {
    weeks
        .iter()
        .filter_map(|week| {
            DateTime::from_timestamp(week.week, 0).map(|start| (start.date_naive(), &week.days))
        })
        .flat_map(|(start, days)| {
            days.iter().enumerate().filter_map(move |(offset, count)| {
                start
                    .checked_add_days(Days::new(offset as u64))
                    .map(|date| HeatmapCell { date, count: *count })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(json: serde_json::Value) -> ActivityEvent {
        activity_event(serde_json::from_value(json).unwrap())
    }

    #[test]
    fn test_push_event_title() {
        let e = event(serde_json::json!({
            "type": "PushEvent",
            "actor": {"login": "steipete"},
            "created_at": "2024-05-01T10:00:00Z",
            "payload": {"ref": "refs/heads/main", "size": 3}
        }));
        assert_eq!(e.title, "pushed 3 commits to main");
        assert_eq!(e.line(), "steipete: pushed 3 commits to main");
        assert!(e.url.is_none());
    }

    #[test]
    fn test_pull_request_event_carries_url() {
        let e = event(serde_json::json!({
            "type": "PullRequestEvent",
            "actor": {"login": "octocat"},
            "created_at": "2024-05-01T10:00:00Z",
            "payload": {
                "action": "opened",
                "pull_request": {"number": 42, "title": "Add cache", "html_url": "https://github.com/a/b/pull/42"}
            }
        }));
        assert_eq!(e.title, "opened PR #42: Add cache");
        assert_eq!(e.url.as_deref(), Some("https://github.com/a/b/pull/42"));
        assert_eq!(e.event_type, "PullRequestEvent");
    }

    #[test]
    fn test_unknown_event_uses_type_name() {
        let e = event(serde_json::json!({
            "type": "GollumEvent",
            "actor": {"login": "octocat"},
            "created_at": "2024-05-01T10:00:00Z"
        }));
        assert_eq!(e.title, "gollum");
    }

    #[test]
    fn test_heatmap_cells_expand_weeks_into_days() {
        // 2024-04-28 is a Sunday.
        let week = NaiveDate::from_ymd_opt(2024, 4, 28)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        let weeks = vec![CommitActivityWeek {
            week,
            days: vec![0, 1, 2, 3, 4, 5, 6],
        }];
        let cells = heatmap_cells(&weeks);
        assert_eq!(cells.len(), 7);
        assert_eq!(cells[0].date, NaiveDate::from_ymd_opt(2024, 4, 28).unwrap());
        assert_eq!(cells[6].date, NaiveDate::from_ymd_opt(2024, 5, 4).unwrap());
        assert_eq!(cells[6].count, 6);
    }

    #[test]
    fn test_commit_summary_keeps_first_message_line() {
        let raw: RawCommit = serde_json::from_value(serde_json::json!({
            "sha": "0123456789abcdef",
            "html_url": "https://github.com/a/b/commit/0123456789abcdef",
            "commit": {
                "message": "Fix cache expiry\n\nLonger body",
                "author": {"name": "Peter", "date": "2024-05-01T10:00:00Z"}
            },
            "author": null
        }))
        .unwrap();
        let summary = RepoCommitSummary::from(raw);
        assert_eq!(summary.message, "Fix cache expiry");
        assert_eq!(summary.short_sha(), "0123456");
        assert_eq!(summary.author_name.as_deref(), Some("Peter"));
        assert!(summary.author_login.is_none());
    }
}
