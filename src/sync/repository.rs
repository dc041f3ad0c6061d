// Merged repository snapshot.
// Combines base details with cached or freshly fetched detail fields.

use chrono::{DateTime, Utc};

use crate::cache::RepoDetailCacheState;
use crate::github::{
    ActivityEvent, CiStatus, HeatmapCell, Release, RepoItem, TrafficStats,
};

/// Everything known about one repository after a refresh.
///
/// `error` is advisory: a snapshot can carry fresh values and an error line at
/// the same time when some field fetches failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub id: u64,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub html_url: Option<String>,
    pub is_private: bool,
    pub is_fork: bool,
    pub is_archived: bool,
    pub stars: u64,
    pub forks: u64,
    pub pushed_at: Option<DateTime<Utc>>,
    pub open_pulls: u64,
    pub open_issues: u64,
    pub ci_status: CiStatus,
    pub ci_run_count: Option<u64>,
    pub latest_release: Option<Release>,
    pub latest_activity: Option<ActivityEvent>,
    pub activity_events: Vec<ActivityEvent>,
    pub traffic: Option<TrafficStats>,
    pub heatmap: Vec<HeatmapCell>,
    pub error: Option<String>,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub detail_cache_state: Option<RepoDetailCacheState>,
    pub discussions_enabled: Option<bool>,
}

impl Repository {
    /// Stand-in returned when the base details could not be fetched.
    pub fn placeholder(
        owner: &str,
        name: &str,
        error: Option<String>,
        rate_limited_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: 0,
            owner: owner.to_string(),
            name: name.to_string(),
            description: None,
            html_url: None,
            is_private: false,
            is_fork: false,
            is_archived: false,
            stars: 0,
            forks: 0,
            pushed_at: None,
            open_pulls: 0,
            open_issues: 0,
            ci_status: CiStatus::Unknown,
            ci_run_count: None,
            latest_release: None,
            latest_activity: None,
            activity_events: Vec::new(),
            traffic: None,
            heatmap: Vec::new(),
            error,
            rate_limited_until,
            detail_cache_state: None,
            discussions_enabled: None,
        }
    }

    /// Base fields from the details response; detail fields start empty.
    pub fn from_item(item: &RepoItem) -> Self {
        Self {
            id: item.id,
            description: item.description.clone(),
            html_url: Some(item.html_url.clone()),
            is_private: item.private,
            is_fork: item.fork,
            is_archived: item.archived,
            stars: item.stargazers_count,
            forks: item.forks_count,
            pushed_at: item.pushed_at,
            open_issues: item.open_issues_count,
            discussions_enabled: item.has_discussions,
            ..Self::placeholder(&item.owner.login, &item.name, None, None)
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == 0 && self.html_url.is_none()
    }

    pub fn activity_line(&self) -> Option<String> {
        self.latest_activity.as_ref().map(ActivityEvent::line)
    }

    /// Newest of the latest activity and the last push.
    pub fn activity_date(&self) -> Option<DateTime<Utc>> {
        let activity = self.latest_activity.as_ref().map(|event| event.date);
        match (activity, self.pushed_at) {
            (Some(a), Some(p)) => Some(a.max(p)),
            (a, p) => a.or(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_placeholder_carries_error() {
        let until = Utc::now();
        let repo = Repository::placeholder("steipete", "RepoBar", Some("boom".into()), Some(until));
        assert!(repo.is_placeholder());
        assert_eq!(repo.full_name(), "steipete/RepoBar");
        assert_eq!(repo.error.as_deref(), Some("boom"));
        assert_eq!(repo.rate_limited_until, Some(until));
        assert_eq!(repo.ci_status, CiStatus::Unknown);
    }

    #[test]
    fn test_activity_date_prefers_newest() {
        let pushed = Utc::now();
        let mut repo = Repository::placeholder("a", "b", None, None);
        assert!(repo.activity_date().is_none());

        repo.pushed_at = Some(pushed);
        assert_eq!(repo.activity_date(), Some(pushed));

        repo.latest_activity = Some(ActivityEvent {
            title: "opened issue #1: x".into(),
            actor: "octocat".into(),
            date: pushed + Duration::hours(1),
            url: None,
            event_type: "IssuesEvent".into(),
        });
        assert_eq!(repo.activity_date(), Some(pushed + Duration::hours(1)));
        assert_eq!(repo.activity_line().as_deref(), Some("octocat: opened issue #1: x"));
    }
}
