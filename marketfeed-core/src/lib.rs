//! marketfeed core: fetch market data with a file cache, retries, and fallback sources.
//!
//! A skill asks the [`Orchestrator`] for a series and always learns what it got:
//! - fresh data, from a recent cache entry or a live fetch
//! - stale data, when every source failed but something was cached
//! - a failure, when every source failed and nothing was cached
//!
//! Sources are described declaratively in a TOML [`Catalog`], tried in order,
//! each with its own retry budget and content check.

pub mod cache;
pub mod catalog;
pub mod check;
pub mod error;
pub mod key;
pub mod orchestrator;
pub mod outcome;
pub mod parse;
pub mod payload;
pub mod retry;
pub mod source;
pub mod strategy;
pub mod transport;

pub use cache::{CacheEntry, CacheError, CacheStatus, CacheStore};
pub use catalog::{Catalog, CatalogError, Feed};
pub use check::ContentCheck;
pub use error::{AttemptError, FetchError};
pub use key::SeriesKey;
pub use orchestrator::{FetchConfig, FetchOptions, Orchestrator};
pub use outcome::{FetchOutcome, OutcomeReport};
pub use parse::ParseError;
pub use payload::{Payload, PayloadEncoding};
pub use retry::{RetryPolicy, RetryPolicyError, Sleeper, ThreadSleeper};
pub use source::{HttpMethod, SourceChain, SourceDescriptor, SourceError, SourceRequest};
pub use strategy::{AttemptRecord, FetchStrategy, Fetched};
pub use transport::{HttpTransport, Response, Transport, TransportError, TransportErrorKind};
