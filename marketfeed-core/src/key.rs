//! Series keys and their on-disk file names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest sanitized prefix kept in a cache file name.
const MAX_STEM_CHARS: usize = 64;

/// Opaque identifier for one logical series or document
/// (a FRED series code, a WASDE release, a ticker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache file name: `series={sanitized}.{hash8}.json`.
    ///
    /// The hash suffix is taken over the raw key, so two keys that sanitize
    /// to the same text still land in different files. The sanitized part is
    /// cut to 64 characters to stay under file-name length limits.
    pub fn file_name(&self) -> String {
        let sanitized: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_STEM_CHARS)
            .collect();
        let hash = blake3::hash(self.0.as_bytes()).to_hex();
        format!("series={sanitized}.{}.json", &hash.as_str()[..8])
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeriesKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SeriesKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
