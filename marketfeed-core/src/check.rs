//! Source-specific content checks.
//!
//! A check decides whether a 2xx response body is usable and, if so, turns
//! it into the [`Payload`] that gets cached. A failed check is retried
//! exactly like a network failure.

use crate::parse::{self, ParseError};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};

fn default_pdf_min_bytes() -> usize {
    1000
}

fn default_min_rows() -> usize {
    1
}

/// Content check configured per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentCheck {
    /// Any body of at least `min_bytes`.
    MinBytes { min_bytes: usize },

    /// PDF magic header and more than `min_bytes`.
    Pdf {
        #[serde(default = "default_pdf_min_bytes")]
        min_bytes: usize,
    },

    /// UTF-8 text, optionally containing a marker string.
    Text {
        #[serde(default)]
        min_bytes: usize,
        #[serde(default)]
        must_contain: Option<String>,
    },

    /// Any well-formed JSON document.
    Json,

    /// FRED graph CSV export.
    CsvSeries {
        #[serde(default = "default_min_rows")]
        min_rows: usize,
    },

    /// FRED observations API JSON.
    FredJson {
        #[serde(default = "default_min_rows")]
        min_rows: usize,
    },

    /// Yahoo Finance v8 chart JSON.
    YahooChart {
        #[serde(default = "default_min_rows")]
        min_rows: usize,
    },
}

impl Default for ContentCheck {
    fn default() -> Self {
        ContentCheck::MinBytes { min_bytes: 1 }
    }
}

impl ContentCheck {
    /// Validate `body` and convert it into a cacheable payload.
    pub fn apply(&self, body: &[u8]) -> Result<Payload, ParseError> {
        match self {
            ContentCheck::MinBytes { min_bytes } => {
                if body.len() < *min_bytes {
                    return Err(ParseError::TooSmall {
                        len: body.len(),
                        min: *min_bytes,
                    });
                }
                Ok(Payload::from_body(body))
            }
            ContentCheck::Pdf { min_bytes } => {
                parse::check_pdf(body, *min_bytes)?;
                Ok(Payload::Bytes(body.to_vec()))
            }
            ContentCheck::Text {
                min_bytes,
                must_contain,
            } => {
                let text = parse::check_text(body, *min_bytes, must_contain.as_deref())?;
                Ok(Payload::Json(serde_json::Value::String(text)))
            }
            ContentCheck::Json => serde_json::from_slice(body)
                .map(Payload::Json)
                .map_err(|e| ParseError::Json(e.to_string())),
            ContentCheck::CsvSeries { min_rows } => {
                let obs = parse::parse_graph_csv(body)?;
                parse::require_rows(parse::numeric_rows(&obs), *min_rows)?;
                to_json(&obs)
            }
            ContentCheck::FredJson { min_rows } => {
                let obs = parse::parse_observations_json(body)?;
                parse::require_rows(parse::numeric_rows(&obs), *min_rows)?;
                to_json(&obs)
            }
            ContentCheck::YahooChart { min_rows } => {
                let bars = parse::parse_chart(body)?;
                let priced = bars.iter().filter(|b| b.close.is_some()).count();
                parse::require_rows(priced, *min_rows)?;
                to_json(&bars)
            }
        }
    }
}

fn to_json<T: Serialize>(rows: &T) -> Result<Payload, ParseError> {
    serde_json::to_value(rows)
        .map(Payload::Json)
        .map_err(|e| ParseError::FormatChanged(format!("re-encode rows: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_series_needs_numeric_rows() {
        let check = ContentCheck::CsvSeries { min_rows: 1 };
        assert_eq!(
            check.apply(b"DATE,DGS10\n2024-01-01,.\n"),
            Err(ParseError::NotEnoughRows { found: 0, min: 1 })
        );

        let payload = check.apply(b"DATE,DGS10\n2024-01-02,3.95\n").unwrap();
        let rows = payload.as_json().unwrap().as_array().unwrap();
        assert_eq!(rows[0]["date"], "2024-01-02");
        assert_eq!(rows[0]["value"], 3.95);
    }

    #[test]
    fn pdf_check_keeps_bytes() {
        let mut body = b"%PDF-1.7".to_vec();
        body.resize(1500, b'x');
        let payload = ContentCheck::Pdf { min_bytes: 1000 }.apply(&body).unwrap();
        assert_eq!(payload.as_bytes(), Some(body.as_slice()));
    }

    #[test]
    fn min_bytes_rejects_short_bodies() {
        let check = ContentCheck::MinBytes { min_bytes: 10 };
        assert!(check.apply(b"short").is_err());
        assert!(check.apply(b"long enough body").is_ok());
    }

    #[test]
    fn json_check_rejects_garbage() {
        assert!(ContentCheck::Json.apply(b"{\"ok\":true}").is_ok());
        assert!(matches!(
            ContentCheck::Json.apply(b"<html>"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn deserializes_from_toml_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            check: ContentCheck,
        }
        let w: Wrapper = toml::from_str(r#"check = { type = "pdf" }"#).unwrap();
        assert_eq!(w.check, ContentCheck::Pdf { min_bytes: 1000 });

        let w: Wrapper =
            toml::from_str(r#"check = { type = "text", must_contain = "Country" }"#).unwrap();
        assert_eq!(
            w.check,
            ContentCheck::Text {
                min_bytes: 0,
                must_contain: Some("Country".into())
            }
        );
    }
}
