//! Retry + backoff + fallback over a source chain.
//!
//! Sources are tried strictly in chain order, one at a time, each with its
//! full attempt budget. The first attempt whose response passes the
//! source's content check wins; nothing further is requested.

use crate::error::{AttemptError, FetchError};
use crate::key::SeriesKey;
use crate::payload::Payload;
use crate::retry::{RetryPolicy, Sleeper};
use crate::source::{SourceChain, SourceDescriptor};
use crate::transport::Transport;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One request issued against one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub source: String,
    /// 0-indexed attempt number within this source's budget.
    pub attempt: u32,
    /// `None` for the successful attempt.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<AttemptError>,
    /// Backoff slept after this attempt before retrying the same source.
    pub backoff: Option<Duration>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<AttemptError>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

/// A payload that passed its source's content check.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: Payload,
    pub source: String,
    pub proxy_for: Option<String>,
    pub attempts: Vec<AttemptRecord>,
}

/// Walks a [`SourceChain`] under a [`RetryPolicy`].
pub struct FetchStrategy<'a> {
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
}

impl<'a> FetchStrategy<'a> {
    pub fn new(transport: &'a dyn Transport, sleeper: &'a dyn Sleeper) -> Self {
        Self { transport, sleeper }
    }

    /// Produce a payload for `key` or a definitive failure.
    pub fn run(
        &self,
        key: &SeriesKey,
        chain: &SourceChain,
        policy: &RetryPolicy,
    ) -> Result<Fetched, FetchError> {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_failure: Option<(String, AttemptError)> = None;

        for (position, source) in chain.sources().iter().enumerate() {
            if let Some((failed, _)) = &last_failure {
                info!(key = %key, from = %failed, to = %source.name, "falling back to next source");
            }

            for attempt in 0..policy.max_attempts() {
                match self.attempt(key, chain, source) {
                    Ok(payload) => {
                        debug!(key = %key, source = %source.name, attempt, "attempt succeeded");
                        attempts.push(AttemptRecord {
                            source: source.name.clone(),
                            attempt,
                            error: None,
                            backoff: None,
                        });
                        return Ok(Fetched {
                            payload,
                            source: source.name.clone(),
                            proxy_for: source.proxy_for.clone(),
                            attempts,
                        });
                    }
                    Err(err) => {
                        let give_up = policy.is_last_attempt(attempt) || !err.is_transient();
                        let backoff = (!give_up).then(|| policy.delay_after(attempt));
                        warn!(
                            key = %key,
                            source = %source.name,
                            chain_position = position,
                            attempt = attempt + 1,
                            max_attempts = policy.max_attempts(),
                            transient = err.is_transient(),
                            error = %err,
                            "fetch attempt failed"
                        );
                        attempts.push(AttemptRecord {
                            source: source.name.clone(),
                            attempt,
                            error: Some(err.clone()),
                            backoff,
                        });
                        last_failure = Some((source.name.clone(), err));

                        match backoff {
                            Some(delay) => self.sleeper.sleep(delay),
                            None => break,
                        }
                    }
                }
            }
        }

        let Some((last_source, last_error)) = last_failure else {
            return Err(FetchError::EmptyChain { key: key.clone() });
        };
        Err(FetchError::ChainExhausted {
            key: key.clone(),
            sources: chain.len(),
            attempts: attempts.len(),
            last_source,
            last_error,
        })
    }

    fn attempt(
        &self,
        key: &SeriesKey,
        chain: &SourceChain,
        source: &SourceDescriptor,
    ) -> Result<Payload, AttemptError> {
        let request = chain.request_for(source, key)?;
        let response = self.transport.execute(&request)?;
        if !response.is_success() {
            return Err(AttemptError::Status {
                status: response.status,
            });
        }
        Ok(source.check.apply(&response.body)?)
    }
}
