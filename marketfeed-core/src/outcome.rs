//! The result of one orchestrated fetch and how it is shown to operators.
//!
//! Every outcome renders to a one-line summary with its variant and age.

use crate::cache::CacheEntry;
use crate::error::FetchError;
use crate::payload::PayloadEncoding;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Constructed once per [`crate::Orchestrator::fetch`] call, never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Served from a fresh cache entry or a successful live fetch.
    Fresh(CacheEntry),
    /// Every source failed; an expired entry is returned instead.
    Stale { entry: CacheEntry, reason: String },
    /// Every source failed and nothing was cached.
    Failed { error: FetchError },
}

impl FetchOutcome {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            FetchOutcome::Fresh(entry) | FetchOutcome::Stale { entry, .. } => Some(entry),
            FetchOutcome::Failed { .. } => None,
        }
    }

    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            FetchOutcome::Fresh(entry) | FetchOutcome::Stale { entry, .. } => Some(entry),
            FetchOutcome::Failed { .. } => None,
        }
    }

    /// Whether the caller got some data, even expired data.
    pub fn is_usable(&self) -> bool {
        !matches!(self, FetchOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Fresh(_) => "fresh",
            FetchOutcome::Stale { .. } => "stale",
            FetchOutcome::Failed { .. } => "failed",
        }
    }

    /// Process exit code for a skill: only `Failed` is non-zero.
    pub fn exit_code(&self) -> i32 {
        if self.is_usable() {
            0
        } else {
            1
        }
    }

    /// The series the data stands in for, when a proxy source served it.
    pub fn proxied_for(&self) -> Option<&str> {
        self.entry().and_then(|e| e.proxy_for.as_deref())
    }

    /// Operator-facing one-liner.
    pub fn summary_line(&self, now: DateTime<Utc>) -> String {
        let proxy = |entry: &CacheEntry| match &entry.proxy_for {
            Some(original) => format!(" [PROXY for {original}]"),
            None => String::new(),
        };
        match self {
            FetchOutcome::Fresh(entry) => format!(
                "FRESH {} via {} (age {}){}",
                entry.key,
                entry.source,
                format_age(entry.age_at(now)),
                proxy(entry)
            ),
            FetchOutcome::Stale { entry, reason } => format!(
                "STALE {} via {} (age {}){}: {reason}",
                entry.key,
                entry.source,
                format_age(entry.age_at(now)),
                proxy(entry)
            ),
            FetchOutcome::Failed { error } => format!("FAILED {}: {error}", error.key()),
        }
    }

    /// Serializable report for JSON output.
    pub fn report(&self, now: DateTime<Utc>) -> OutcomeReport {
        match self {
            FetchOutcome::Fresh(entry) => OutcomeReport::from_entry("fresh", entry, None, now),
            FetchOutcome::Stale { entry, reason } => {
                OutcomeReport::from_entry("stale", entry, Some(reason.clone()), now)
            }
            FetchOutcome::Failed { error } => OutcomeReport {
                status: "failed",
                key: error.key().to_string(),
                source: None,
                proxy_for: None,
                fetched_at: None,
                age_secs: None,
                reason: Some(error.to_string()),
                encoding: None,
                payload: None,
            },
        }
    }
}

/// JSON shape printed by skills.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeReport {
    pub status: &'static str,
    pub key: String,
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_for: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<PayloadEncoding>,
    pub payload: Option<serde_json::Value>,
}

impl OutcomeReport {
    fn from_entry(
        status: &'static str,
        entry: &CacheEntry,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            key: entry.key.to_string(),
            source: Some(entry.source.clone()),
            proxy_for: entry.proxy_for.clone(),
            fetched_at: Some(entry.fetched_at),
            age_secs: Some(entry.age_at(now).as_secs()),
            reason,
            encoding: Some(entry.payload.encoding()),
            payload: Some(entry.payload.to_value()),
        }
    }
}

/// Compact age: `2d 3h`, `5h 12m`, `42m`, `17s`.
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    let (days, hours, mins) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m")
    } else {
        format!("{secs}s")
    }
}
