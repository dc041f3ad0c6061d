// Timestamped values and JSON blobs on disk.
// Freshness is inclusive of the TTL boundary; disk writes replace the file in one rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::Result;

/// Whether a value fetched at `fetched_at` is still fresh at `now`.
///
/// Timestamps in the future count as zero elapsed time.
pub fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let elapsed = now
        .signed_duration_since(fetched_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    elapsed <= ttl
}

/// A value and the moment it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.is_valid(now, ttl)
    }

    pub fn is_valid(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        is_fresh(self.cached_at, now, ttl)
    }
}

/// Deserialize `path`; a missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Serialize `data` to `path`, creating parent directories.
///
/// Readers never observe a partially written file.
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec(data)?;

    let staging = staging_path(path);
    let mut file = fs::File::create(&staging)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&staging, path)?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.partial", std::process::id()));
    path.with_file_name(name)
}

/// Remove a cache directory tree; absent is fine.
pub fn delete_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
