//! Fetched content, either structured JSON or raw bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// The content of a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parsed rows, a JSON document, or text stored as a JSON string.
    Json(serde_json::Value),
    /// Binary documents such as PDFs.
    Bytes(Vec<u8>),
}

/// How a payload is written inside a cache record or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    #[default]
    Json,
    Base64,
}

impl Payload {
    pub fn encoding(&self) -> PayloadEncoding {
        match self {
            Payload::Json(_) => PayloadEncoding::Json,
            Payload::Bytes(_) => PayloadEncoding::Base64,
        }
    }

    /// JSON form used on disk: the value itself, or a base64 string.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Payload::Json(v) => v.clone(),
            Payload::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
        }
    }

    /// Inverse of [`Payload::to_value`]. `None` if a base64 payload is not a
    /// valid base64 string.
    pub fn from_value(value: serde_json::Value, encoding: PayloadEncoding) -> Option<Self> {
        match encoding {
            PayloadEncoding::Json => Some(Payload::Json(value)),
            PayloadEncoding::Base64 => {
                let s = value.as_str()?;
                STANDARD.decode(s).ok().map(Payload::Bytes)
            }
        }
    }

    /// Raw text or bytes become a JSON string when they are valid UTF-8.
    pub fn from_body(body: &[u8]) -> Self {
        match std::str::from_utf8(body) {
            Ok(text) => Payload::Json(serde_json::Value::String(text.to_string())),
            Err(_) => Payload::Bytes(body.to_vec()),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Json(_) => None,
            Payload::Bytes(b) => Some(b),
        }
    }
}
