/// Upstream gauge network ingestion.
///
/// - `transport` - HTTP exchange with backoff, retry budget and circuit breaker
/// - `client`    - endpoint URLs and typed fetch + decode operations
/// - `latest`    - GeoJSON latest-feed decoder
/// - `series`    - single-station CSV decoder
/// - `group`     - multi-station group CSV decoder (matrix pivot)
/// - `fixtures`  - (test only) representative payloads

pub mod client;
pub mod group;
pub mod latest;
pub mod series;
pub mod transport;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::model::DecodeError;

/// Timestamp layout used by every upstream CSV file. No zone is published;
/// values are treated as UTC to line up with the RFC 3339 JSON feed.
pub const GAUGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub(crate) fn parse_gauge_time(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), GAUGE_TIME_FORMAT).map_err(|e| {
        DecodeError::Timestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Iterates the non-blank lines of a CSV body as `(line_number, fields)`,
/// line numbers starting at 1.
pub(crate) fn csv_records(
    body: &str,
) -> impl Iterator<Item = (usize, Result<Vec<String>, DecodeError>)> + '_ {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, split_record(line)))
}

/// Splits one CSV line into fields. Double-quoted fields may contain commas
/// and `""` escapes.
fn split_record(line: &str) -> Result<Vec<String>, DecodeError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(DecodeError::UnterminatedQuote);
    }
    fields.push(field);
    Ok(fields)
}
