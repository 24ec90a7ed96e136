//! FRED series parsers: the graph CSV export and the observations API.

use super::{Observation, ParseError};
use chrono::NaiveDate;
use serde::Deserialize;

/// FRED marks missing observations with a lone dot.
const MISSING: &str = ".";

/// Parse a `fredgraph.csv` export.
///
/// The first column is the date (`DATE` or `observation_date` depending on
/// the export vintage), the second the series value.
pub fn parse_graph_csv(body: &[u8]) -> Result<Vec<Observation>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| ParseError::Csv(e.to_string()))?
        .clone();
    if headers.len() < 2 {
        return Err(ParseError::FormatChanged(format!(
            "expected date and value columns, got {} column(s)",
            headers.len()
        )));
    }
    let date_col = &headers[0];
    if !date_col.eq_ignore_ascii_case("date") && !date_col.eq_ignore_ascii_case("observation_date")
    {
        return Err(ParseError::FormatChanged(format!(
            "unexpected date column '{date_col}'"
        )));
    }

    let mut observations = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ParseError::Csv(format!("row {}: {e}", row + 1)))?;
        let date = parse_date(record.get(0).unwrap_or_default())?;
        let value = parse_value(record.get(1).unwrap_or_default())?;
        observations.push(Observation { date, value });
    }

    Ok(observations)
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

/// Parse a `fred/series/observations?file_type=json` response.
pub fn parse_observations_json(body: &[u8]) -> Result<Vec<Observation>, ParseError> {
    let resp: ObservationsResponse =
        serde_json::from_slice(body).map_err(|e| ParseError::Json(e.to_string()))?;

    resp.observations
        .into_iter()
        .map(|raw| {
            Ok(Observation {
                date: parse_date(&raw.date)?,
                value: parse_value(&raw.value)?,
            })
        })
        .collect()
}

fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| ParseError::FormatChanged(format!("bad date '{s}': {e}")))
}

fn parse_value(s: &str) -> Result<Option<f64>, ParseError> {
    let s = s.trim();
    if s.is_empty() || s == MISSING {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|e| ParseError::FormatChanged(format!("bad value '{s}': {e}")))
}
