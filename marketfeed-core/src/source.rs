//! Source descriptors and the ordered chain the fetch strategy walks.
//!
//! A descriptor says how to build a request for a key (URL template,
//! method, timeout), how to judge the response ([`ContentCheck`]) and what
//! it needs in order to run at all (`requires_env`). Availability is checked
//! once when the chain is built; unavailable members never enter the chain.
//! The environment values a member's template refers to are captured at the
//! same time, so requests are rendered from what was checked.

use crate::check::ContentCheck;
use crate::key::SeriesKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source '{source_name}': environment variable {var} is not set")]
    MissingEnv { source_name: String, var: String },

    #[error("source '{source_name}': unknown placeholder {{{placeholder}}} in URL template")]
    UnknownPlaceholder {
        source_name: String,
        placeholder: String,
    },

    #[error("source '{source_name}': unterminated placeholder in URL template")]
    UnterminatedPlaceholder { source_name: String },

    #[error("no source named '{0}' in the chain")]
    UnknownSource(String),

    #[error("source '{name}' is unavailable (missing {missing})")]
    Unavailable { name: String, missing: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// How to obtain one key from one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    /// URL with `{key}` and `{env:NAME}` placeholders.
    #[serde(rename = "url")]
    pub url_template: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub check: ContentCheck,
    /// Environment variables that must be set for this source to be used.
    #[serde(default)]
    pub requires_env: Vec<String>,
    /// Set when this source serves a stand-in for the requested series
    /// (e.g. US 10Y yield in place of JGB 10Y).
    #[serde(default)]
    pub proxy_for: Option<String>,
}

/// A rendered request, ready for a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub source: String,
    pub method: HttpMethod,
    pub url: String,
    pub timeout: Duration,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            method: HttpMethod::Get,
            timeout_secs: default_timeout_secs(),
            check: ContentCheck::default(),
            requires_env: Vec::new(),
            proxy_for: None,
        }
    }

    pub fn with_check(mut self, check: ContentCheck) -> Self {
        self.check = check;
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn requiring_env(mut self, var: impl Into<String>) -> Self {
        self.requires_env.push(var.into());
        self
    }

    pub fn proxying(mut self, original: impl Into<String>) -> Self {
        self.proxy_for = Some(original.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Required variables that `lookup` cannot resolve to a non-empty value.
    pub fn missing_env(&self, lookup: &dyn Fn(&str) -> Option<String>) -> Vec<String> {
        self.requires_env
            .iter()
            .filter(|var| lookup(var.as_str()).map_or(true, |v| v.is_empty()))
            .cloned()
            .collect()
    }

    /// Every variable this source reads: declared preconditions first, then
    /// `{env:NAME}` placeholders in the URL template.
    pub fn env_vars(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.requires_env.iter().map(String::as_str).collect();
        let mut rest = self.url_template.as_str();
        while let Some(start) = rest.find("{env:") {
            let after = &rest[start + 5..];
            let Some(end) = after.find('}') else { break };
            if !vars.contains(&&after[..end]) {
                vars.push(&after[..end]);
            }
            rest = &after[end + 1..];
        }
        vars
    }

    /// Render the request for `key`, resolving `{env:NAME}` through `lookup`.
    pub fn request_with(
        &self,
        key: &SeriesKey,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<SourceRequest, SourceError> {
        let mut url = String::with_capacity(self.url_template.len() + key.as_str().len());
        let mut rest = self.url_template.as_str();

        while let Some(open) = rest.find('{') {
            url.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| SourceError::UnterminatedPlaceholder {
                    source_name: self.name.clone(),
                })?;
            let placeholder = &after[..close];

            if placeholder == "key" {
                url.push_str(&urlencoding::encode(key.as_str()));
            } else if let Some(var) = placeholder.strip_prefix("env:") {
                let value = lookup(var)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| SourceError::MissingEnv {
                        source_name: self.name.clone(),
                        var: var.to_string(),
                    })?;
                url.push_str(&value);
            } else {
                return Err(SourceError::UnknownPlaceholder {
                    source_name: self.name.clone(),
                    placeholder: placeholder.to_string(),
                });
            }
            rest = &after[close + 1..];
        }
        url.push_str(rest);

        Ok(SourceRequest {
            source: self.name.clone(),
            method: self.method,
            url,
            timeout: self.timeout(),
        })
    }
}

/// A chain member dropped because its precondition failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub name: String,
    pub missing_env: Vec<String>,
}

/// Ordered providers for a key: primary first, fallbacks after.
#[derive(Debug, Clone, Default)]
pub struct SourceChain {
    sources: Vec<SourceDescriptor>,
    skipped: Vec<SkippedSource>,
    env: BTreeMap<String, String>,
}

impl SourceChain {
    /// Build a chain, checking each member's availability against the
    /// process environment.
    pub fn new(candidates: Vec<SourceDescriptor>) -> Self {
        Self::with_env_lookup(candidates, &|name| std::env::var(name).ok())
    }

    /// Build a chain, checking availability through `lookup`.
    pub fn with_env_lookup(
        candidates: Vec<SourceDescriptor>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let mut sources = Vec::with_capacity(candidates.len());
        let mut skipped = Vec::new();
        let mut env = BTreeMap::new();

        for source in candidates {
            let missing = source.missing_env(lookup);
            if missing.is_empty() {
                for var in source.env_vars() {
                    if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                        env.insert(var.to_string(), value);
                    }
                }
                sources.push(source);
            } else {
                info!(
                    source = %source.name,
                    missing = %missing.join(", "),
                    "source unavailable, leaving it out of the chain"
                );
                skipped.push(SkippedSource {
                    name: source.name,
                    missing_env: missing,
                });
            }
        }

        Self {
            sources,
            skipped,
            env,
        }
    }

    /// Render the request for `key` against `source`, resolving
    /// `{env:NAME}` from the values captured when the chain was built.
    pub fn request_for(
        &self,
        source: &SourceDescriptor,
        key: &SeriesKey,
    ) -> Result<SourceRequest, SourceError> {
        source.request_with(key, &|name| self.env.get(name).cloned())
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn skipped(&self) -> &[SkippedSource] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    /// Keep only the named members, in chain order.
    ///
    /// Naming a member that was skipped for a failed precondition, or one
    /// that does not exist, is an error rather than a silent no-op.
    pub fn restrict<S: AsRef<str>>(&self, names: &[S]) -> Result<SourceChain, SourceError> {
        for name in names {
            let name = name.as_ref();
            if self.sources.iter().any(|s| s.name == name) {
                continue;
            }
            if let Some(skip) = self.skipped.iter().find(|s| s.name == name) {
                return Err(SourceError::Unavailable {
                    name: name.to_string(),
                    missing: skip.missing_env.join(", "),
                });
            }
            return Err(SourceError::UnknownSource(name.to_string()));
        }

        Ok(SourceChain {
            sources: self
                .sources
                .iter()
                .filter(|s| names.iter().any(|n| n.as_ref() == s.name))
                .cloned()
                .collect(),
            skipped: self.skipped.clone(),
            env: self.env.clone(),
        })
    }
}
