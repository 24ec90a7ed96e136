//! Pure parsers for third-party payloads.
//!
//! Every parser has the same contract: bytes in, structured value or
//! [`ParseError`] out. They know nothing about retries or caching; the
//! content checks in [`crate::check`] call them on each response body.

pub mod document;
pub mod fred;
pub mod yahoo;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use document::{check_pdf, check_text, PDF_MAGIC};
pub use fred::{parse_graph_csv, parse_observations_json};
pub use yahoo::{parse_chart, DailyBar};

/// Why a response body was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("payload too small: {len} bytes (minimum {min})")]
    TooSmall { len: usize, min: usize },

    #[error("missing {expected} magic header")]
    BadMagic { expected: &'static str },

    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("expected marker text not found: {0:?}")]
    MissingMarker(String),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("invalid CSV: {0}")]
    Csv(String),

    #[error("only {found} usable rows (minimum {min})")]
    NotEnoughRows { found: usize, min: usize },

    #[error("response format changed: {0}")]
    FormatChanged(String),
}

/// One dated value of an economic series. `None` marks a missing print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Count observations carrying a finite numeric value.
pub fn numeric_rows(observations: &[Observation]) -> usize {
    observations
        .iter()
        .filter(|o| o.value.is_some_and(f64::is_finite))
        .count()
}

/// Require at least `min` usable rows.
pub(crate) fn require_rows(found: usize, min: usize) -> Result<(), ParseError> {
    if found < min {
        return Err(ParseError::NotEnoughRows { found, min });
    }
    Ok(())
}
