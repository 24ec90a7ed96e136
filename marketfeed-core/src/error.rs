//! Attempt- and chain-level failures.

use crate::key::SeriesKey;
use crate::parse::ParseError;
use crate::source::SourceError;
use crate::transport::TransportError;
use thiserror::Error;

/// Why a single attempt against a single source produced no usable data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("rejected payload: {0}")]
    Rejected(#[from] ParseError),

    #[error(transparent)]
    Request(#[from] SourceError),
}

impl AttemptError {
    /// Transient failures are retried within the source's attempt budget:
    /// timeouts, connection errors, 5xx, 408, 429 and content-check
    /// failures (a short or garbled body often means an interrupted
    /// transfer). Anything else exhausts the source at once.
    pub fn is_transient(&self) -> bool {
        match self {
            AttemptError::Transport(_) => true,
            AttemptError::Status { status } => *status >= 500 || matches!(*status, 408 | 429),
            AttemptError::Rejected(_) => true,
            AttemptError::Request(_) => false,
        }
    }
}

/// Definitive failure of one orchestrated fetch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("no sources available for '{key}'")]
    EmptyChain { key: SeriesKey },

    #[error(
        "all {sources} source(s) failed for '{key}' after {attempts} attempt(s); \
         last error from '{last_source}': {last_error}"
    )]
    ChainExhausted {
        key: SeriesKey,
        sources: usize,
        attempts: usize,
        last_source: String,
        last_error: AttemptError,
    },
}

impl FetchError {
    pub fn key(&self) -> &SeriesKey {
        match self {
            FetchError::EmptyChain { key } | FetchError::ChainExhausted { key, .. } => key,
        }
    }
}
