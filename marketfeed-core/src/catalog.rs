//! Feed catalog: per-skill freshness, retry policy, and source chains.
//!
//! The catalog is a TOML file with one `[feeds.<name>]` table per skill.
//! A built-in catalog ships with the crate; callers may load their own.

use crate::orchestrator::FetchOptions;
use crate::retry::RetryPolicy;
use crate::source::{SourceChain, SourceDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const BUILTIN: &str = include_str!("../catalog/default.toml");

/// Longest freshness window accepted, ten years.
const MAX_AGE_HOURS_LIMIT: f64 = 24.0 * 365.0 * 10.0;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse catalog TOML: {0}")]
    Parse(String),

    #[error("feed '{feed}': {reason}")]
    Invalid { feed: String, reason: String },

    #[error("unknown feed '{name}' (available: {available})")]
    UnknownFeed { name: String, available: String },
}

/// One skill's data acquisition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub description: String,
    pub max_age_hours: f64,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub sources: Vec<SourceDescriptor>,
}

impl Feed {
    pub fn max_age(&self) -> Duration {
        if self.max_age_hours.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.max_age_hours.clamp(0.0, MAX_AGE_HOURS_LIMIT) * 3600.0)
    }

    /// Source chain with availability checked against the environment now.
    pub fn chain(&self) -> SourceChain {
        SourceChain::new(self.sources.clone())
    }

    pub fn options(&self) -> FetchOptions {
        FetchOptions::new(self.max_age()).with_retry(self.retry.clone())
    }

    fn validate(&self, name: &str) -> Result<(), CatalogError> {
        let invalid = |reason: String| CatalogError::Invalid {
            feed: name.to_string(),
            reason,
        };

        if !self.max_age_hours.is_finite()
            || self.max_age_hours < 0.0
            || self.max_age_hours > MAX_AGE_HOURS_LIMIT
        {
            return Err(invalid(format!(
                "max_age_hours must be between 0 and {MAX_AGE_HOURS_LIMIT}, got {}",
                self.max_age_hours
            )));
        }
        if self.sources.is_empty() {
            return Err(invalid("no sources configured".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(invalid(format!("duplicate source name '{}'", source.name)));
            }
            if source.timeout_secs == 0 {
                return Err(invalid(format!("source '{}' has a zero timeout", source.name)));
            }
        }
        Ok(())
    }
}

/// All configured feeds, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub feeds: BTreeMap<String, Feed>,
}

impl Catalog {
    /// Load a catalog from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a catalog from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog =
            toml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;
        for (name, feed) in &catalog.feeds {
            feed.validate(name)?;
        }
        Ok(catalog)
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml(BUILTIN)
    }

    pub fn feed(&self, name: &str) -> Result<&Feed, CatalogError> {
        self.feeds.get(name).ok_or_else(|| CatalogError::UnknownFeed {
            name: name.to_string(),
            available: self.feed_names().join(", "),
        })
    }

    pub fn feed_names(&self) -> Vec<&str> {
        self.feeds.keys().map(String::as_str).collect()
    }

    /// Serialize the catalog back to TOML.
    pub fn to_toml(&self) -> Result<String, CatalogError> {
        toml::to_string_pretty(self).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}
