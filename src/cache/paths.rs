// Cache path utilities.
// Constructs filesystem paths for the on-disk repository detail cache.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Get the base cache directory (~/.cache/repobar on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "repobar").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Directory holding one JSON blob per tracked repository.
pub fn repo_details_dir(base: &Path) -> PathBuf {
    base.join("repo-details")
}

/// Path to the detail cache blob for a repository on a given API host.
pub fn repo_detail_path(base: &Path, api_host: &str, owner: &str, name: &str) -> PathBuf {
    repo_details_dir(base)
        .join(sanitize_name(&host_component(api_host)))
        .join(sanitize_name(&owner.to_lowercase()))
        .join(format!("{}.json", sanitize_name(&name.to_lowercase())))
}

/// Strip the scheme so `https://api.github.com` becomes `api.github.com`.
fn host_component(api_host: &str) -> String {
    let trimmed = api_host.trim_end_matches('/');
    trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed)
        .to_lowercase()
}

/// Sanitize a name for use in filesystem paths.
/// Replaces problematic characters with underscores.
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("simple"), "simple");
        assert_eq!(sanitize_name("with/slash"), "with_slash");
        assert_eq!(sanitize_name("owner:name"), "owner_name");
    }

    #[test]
    fn test_repo_detail_path() {
        let base = Path::new("/tmp/repobar");

        let path = repo_detail_path(base, "https://api.github.com", "Steipete", "RepoBar");
        assert!(path.ends_with("repo-details/api.github.com/steipete/repobar.json"));

        let enterprise = repo_detail_path(base, "https://git.corp/api/v3/", "team", "svc");
        assert!(enterprise.ends_with("repo-details/git.corp_api_v3/team/svc.json"));
    }
}
