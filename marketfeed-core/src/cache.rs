//! Time-boxed JSON file cache, one record per series key.
//!
//! Layout: `{cache_dir}/series={KEY}.{hash8}.json`
//!
//! - Atomic writes (write to `.tmp`, rename into place)
//! - Unreadable or malformed records are cache misses, never errors
//! - Freshness is decided by the caller's `max_age`, never by the store
//! - Records are only removed by explicit `clear` / `clean_older_than`

use crate::key::SeriesKey;
use crate::payload::{Payload, PayloadEncoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache record serialization: {0}")]
    Serialize(String),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One cached fetch result. Never mutated; a refresh writes a new entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: SeriesKey,
    pub payload: Payload,
    /// Wall-clock time of the successful fetch that produced this entry.
    pub fetched_at: DateTime<Utc>,
    /// Name of the source-chain member that produced the payload.
    pub source: String,
    /// Set when the source is a stand-in for a different series.
    pub proxy_for: Option<String>,
}

impl CacheEntry {
    /// Age of the entry relative to `now` (zero if `fetched_at` is in the future).
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }
}

/// On-disk shape of a cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    key: SeriesKey,
    payload: serde_json::Value,
    fetched_at: DateTime<Utc>,
    source: String,
    #[serde(default)]
    encoding: PayloadEncoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proxy_for: Option<String>,
}

impl CacheRecord {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            payload: entry.payload.to_value(),
            fetched_at: entry.fetched_at,
            source: entry.source.clone(),
            encoding: entry.payload.encoding(),
            proxy_for: entry.proxy_for.clone(),
        }
    }

    fn into_entry(self) -> Result<CacheEntry, String> {
        let payload = Payload::from_value(self.payload, self.encoding)
            .ok_or_else(|| "payload does not match its encoding".to_string())?;
        Ok(CacheEntry {
            key: self.key,
            payload,
            fetched_at: self.fetched_at,
            source: self.source,
            proxy_for: self.proxy_for,
        })
    }
}

fn decode_record(content: &[u8]) -> Result<CacheEntry, String> {
    let record: CacheRecord = serde_json::from_slice(content).map_err(|e| e.to_string())?;
    record.into_entry()
}

/// Summary of one record on disk, for `cache status` style listings.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub file: PathBuf,
    pub bytes: u64,
    pub key: Option<SeriesKey>,
    pub source: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub corrupt: bool,
}

/// The file cache for one skill.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the record for `key`.
    pub fn entry_path(&self, key: &SeriesKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    /// Load the entry for `key` regardless of its age.
    ///
    /// Read or parse failures are logged and reported as a miss; the next
    /// successful put overwrites the bad record.
    pub fn get(&self, key: &SeriesKey) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache record, treating as miss");
                return None;
            }
        };

        match decode_record(&content) {
            Ok(entry) if entry.key == *key => Some(entry),
            Ok(entry) => {
                warn!(
                    path = %path.display(),
                    expected = %key,
                    found = %entry.key,
                    "cache record belongs to another key, treating as miss"
                );
                None
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "corrupt cache record, treating as miss");
                None
            }
        }
    }

    /// Store `payload` for `key`, stamped with the current time.
    ///
    /// Overwrites any previous entry. The record is written to a temporary
    /// file and renamed into place so readers never see a partial write.
    pub fn put(
        &self,
        key: &SeriesKey,
        payload: Payload,
        source: &str,
        proxy_for: Option<&str>,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            fetched_at: Utc::now(),
            source: source.to_string(),
            proxy_for: proxy_for.map(str::to_string),
        };

        fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))?;

        let json = serde_json::to_vec_pretty(&CacheRecord::from_entry(&entry))
            .map_err(|e| CacheError::Serialize(e.to_string()))?;

        let path = self.entry_path(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| CacheError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::io(&path, e)
        })?;

        debug!(key = %key, source, path = %path.display(), "cache record written");
        Ok(entry)
    }

    /// `now - entry.fetched_at < max_age`, evaluated against the wall clock.
    pub fn is_fresh(entry: &CacheEntry, max_age: Duration) -> bool {
        Self::is_fresh_at(entry, max_age, Utc::now())
    }

    /// Freshness against an explicit `now`. Depends only on `fetched_at`.
    pub fn is_fresh_at(entry: &CacheEntry, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now - entry.fetched_at < max_age,
            // Larger than chrono can represent: nothing is that old.
            Err(_) => true,
        }
    }

    /// Remove the entry for `key`. Returns `false` if there was none.
    pub fn clear(&self, key: &SeriesKey) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// List every record in the cache directory, sorted by file name.
    pub fn status(&self) -> Result<Vec<CacheStatus>, CacheError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.cache_dir, e)),
        };

        let mut rows = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.cache_dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("series=") || !name.ends_with(".json") {
                continue;
            }

            let bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let decoded = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| decode_record(&c));
            rows.push(match decoded {
                Ok(record) => CacheStatus {
                    file: path,
                    bytes,
                    key: Some(record.key),
                    source: Some(record.source),
                    fetched_at: Some(record.fetched_at),
                    corrupt: false,
                },
                Err(_) => CacheStatus {
                    file: path,
                    bytes,
                    key: None,
                    source: None,
                    fetched_at: None,
                    corrupt: true,
                },
            });
        }

        rows.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(rows)
    }

    /// Remove records fetched more than `age` ago.
    ///
    /// Corrupt records are left alone. With `dry_run` nothing is deleted;
    /// either way the affected records are returned.
    pub fn clean_older_than(
        &self,
        age: Duration,
        dry_run: bool,
    ) -> Result<Vec<CacheStatus>, CacheError> {
        let now = Utc::now();
        let expired: Vec<CacheStatus> = self
            .status()?
            .into_iter()
            .filter(|row| match (row.fetched_at, chrono::Duration::from_std(age)) {
                (Some(at), Ok(age)) => now - at > age,
                _ => false,
            })
            .collect();

        if !dry_run {
            for row in &expired {
                fs::remove_file(&row.file).map_err(|e| CacheError::io(&row.file, e))?;
            }
        }
        Ok(expired)
    }
}
