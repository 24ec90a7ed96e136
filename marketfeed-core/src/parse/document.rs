//! Sanity checks for opaque documents (PDF reports, fixed-width text tables).

use super::ParseError;

/// Every PDF starts with these five bytes.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Accept `body` as a PDF if it carries the magic header and is larger
/// than `min_bytes`. A short body usually means an interrupted transfer.
pub fn check_pdf(body: &[u8], min_bytes: usize) -> Result<(), ParseError> {
    if body.len() <= min_bytes {
        return Err(ParseError::TooSmall {
            len: body.len(),
            min: min_bytes,
        });
    }
    if !body.starts_with(PDF_MAGIC) {
        return Err(ParseError::BadMagic { expected: "PDF" });
    }
    Ok(())
}

/// Accept `body` as UTF-8 text of at least `min_bytes`, optionally
/// containing `marker` (e.g. a table heading the scraper relies on).
pub fn check_text(body: &[u8], min_bytes: usize, marker: Option<&str>) -> Result<String, ParseError> {
    if body.len() < min_bytes {
        return Err(ParseError::TooSmall {
            len: body.len(),
            min: min_bytes,
        });
    }
    let text = std::str::from_utf8(body).map_err(|_| ParseError::NotUtf8)?;
    if let Some(marker) = marker {
        if !text.contains(marker) {
            return Err(ParseError::MissingMarker(marker.to_string()));
        }
    }
    Ok(text.to_string())
}
