// Per-endpoint backoff windows.
// Consulted before a request is issued; updated when a response signals throttling.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

/// Tracks cooldown deadlines keyed by normalized endpoint URL.
#[derive(Debug, Default)]
pub struct BackoffTracker {
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cooling_down(&self, endpoint: &str, now: DateTime<Utc>) -> bool {
        self.cooldown(endpoint, now).is_some()
    }

    /// Deadline for `endpoint` if it is still in the future.
    pub fn cooldown(&self, endpoint: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lock()
            .get(&normalize(endpoint))
            .copied()
            .filter(|until| *until > now)
    }

    /// Last write wins, even if it shortens an existing window.
    pub fn set_cooldown(&self, endpoint: &str, until: DateTime<Utc>) {
        self.lock().insert(normalize(endpoint), until);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.cooldowns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(endpoint: &str) -> String {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => url.to_string(),
        Err(_) => endpoint.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const URL: &str = "https://api.github.com/repos/steipete/RepoBar/traffic/views";

    #[test]
    fn test_cooldown_expires_at_deadline() {
        let tracker = BackoffTracker::new();
        let now = Utc::now();
        tracker.set_cooldown(URL, now + Duration::seconds(60));

        assert!(tracker.is_cooling_down(URL, now));
        assert_eq!(tracker.cooldown(URL, now), Some(now + Duration::seconds(60)));
        assert!(!tracker.is_cooling_down(URL, now + Duration::seconds(60)));
        assert!(tracker.cooldown(URL, now + Duration::seconds(61)).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let tracker = BackoffTracker::new();
        let now = Utc::now();
        tracker.set_cooldown(URL, now + Duration::seconds(600));
        tracker.set_cooldown(URL, now + Duration::seconds(5));

        assert_eq!(tracker.cooldown(URL, now), Some(now + Duration::seconds(5)));
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_endpoints_are_independent_and_normalized() {
        let tracker = BackoffTracker::new();
        let now = Utc::now();
        tracker.set_cooldown("HTTPS://API.GITHUB.COM/repos/a/b", now + Duration::seconds(30));

        assert!(tracker.is_cooling_down("https://api.github.com/repos/a/b", now));
        assert!(!tracker.is_cooling_down("https://api.github.com/repos/a/c", now));

        tracker.clear();
        assert!(!tracker.is_cooling_down("https://api.github.com/repos/a/b", now));
        assert_eq!(tracker.count(), 0);
    }
}
