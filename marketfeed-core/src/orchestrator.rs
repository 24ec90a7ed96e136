//! Public entry point: cache first, then the source chain, then degrade.
//!
//! 1. Fresh cache entry and no forced refresh → return it, no network I/O
//! 2. Otherwise walk the source chain; on success cache and return it
//! 3. Chain exhausted but something cached (however old) → `Stale`
//! 4. Chain exhausted and nothing cached → `Failed`

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::key::SeriesKey;
use crate::outcome::FetchOutcome;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::source::SourceChain;
use crate::strategy::FetchStrategy;
use crate::transport::{HttpTransport, Transport, TransportError};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Where an orchestrator keeps its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub cache_dir: PathBuf,
}

impl FetchConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }
}

/// Per-call policy.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Entries younger than this are served without touching the network.
    pub max_age: Duration,
    pub retry: RetryPolicy,
    /// Skip the freshness check and always go to the network.
    pub force_refresh: bool,
}

impl FetchOptions {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            retry: RetryPolicy::default(),
            force_refresh: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn forced(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

/// Combines the cache store and the fetch strategy.
pub struct Orchestrator {
    store: CacheStore,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    pub fn new(config: FetchConfig, transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            store: CacheStore::new(config.cache_dir),
            transport,
            sleeper,
        }
    }

    /// Orchestrator over real HTTP with blocking sleeps.
    pub fn http(config: FetchConfig) -> Result<Self, TransportError> {
        Ok(Self::new(
            config,
            Arc::new(HttpTransport::new()?),
            Arc::new(ThreadSleeper),
        ))
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Give the caller the freshest data available and say what it is.
    pub fn fetch(&self, key: &SeriesKey, chain: &SourceChain, options: &FetchOptions) -> FetchOutcome {
        let cached = self.store.get(key);

        if !options.force_refresh {
            if let Some(entry) = &cached {
                if CacheStore::is_fresh(entry, options.max_age) {
                    info!(key = %key, source = %entry.source, "serving fresh cache entry");
                    return FetchOutcome::Fresh(entry.clone());
                }
            }
        }

        let strategy = FetchStrategy::new(self.transport.as_ref(), self.sleeper.as_ref());
        match strategy.run(key, chain, &options.retry) {
            Ok(fetched) => {
                info!(
                    key = %key,
                    source = %fetched.source,
                    attempts = fetched.attempts.len(),
                    "fetched live data"
                );
                let entry = match self.store.put(
                    key,
                    fetched.payload.clone(),
                    &fetched.source,
                    fetched.proxy_for.as_deref(),
                ) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(key = %key, error = %e, "could not persist fetched data; returning it uncached");
                        CacheEntry {
                            key: key.clone(),
                            payload: fetched.payload,
                            fetched_at: Utc::now(),
                            source: fetched.source,
                            proxy_for: fetched.proxy_for,
                        }
                    }
                };
                FetchOutcome::Fresh(entry)
            }
            Err(error) => match cached {
                Some(entry) => {
                    let held = if CacheStore::is_fresh(&entry, options.max_age) {
                        "cached entry"
                    } else {
                        "expired cache"
                    };
                    warn!(key = %key, error = %error, "all sources failed, falling back to {held}");
                    FetchOutcome::Stale {
                        entry,
                        reason: format!("all sources failed, returning {held}: {error}"),
                    }
                }
                None => {
                    warn!(key = %key, error = %error, "all sources failed and nothing is cached");
                    FetchOutcome::Failed { error }
                }
            },
        }
    }

    /// Drop the cached entry for `key`.
    pub fn clear(&self, key: &SeriesKey) -> Result<bool, CacheError> {
        self.store.clear(key)
    }
}
