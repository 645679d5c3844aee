/// Decoder for multi-station group matrices (`GET /data/group/group_{id}.csv`).
///
/// ```text
/// Datetime, Station A ,Station B
/// 2021-06-15 22:00,0.466,0.053
/// 2021-06-15 22:15,0.470,
/// ```
///
/// Column position in the header fixes the station for every row. The matrix
/// is pivoted row-major into one `GroupReading` per non-empty cell; an empty
/// cell means the station has not reported for that timestamp yet.

use crate::ingest::{csv_records, parse_gauge_time};
use crate::model::{DecodeError, GroupReading, Millimeters};

pub fn parse_group_csv(csv: &str) -> Result<Vec<GroupReading>, DecodeError> {
    let records = csv_records(csv)
        .map(|(line, record)| record.map(|fields| (line, fields)).map_err(|e| e.at_line(line)))
        .collect::<Result<Vec<_>, _>>()?;

    if records.len() < 2 {
        return Err(DecodeError::EmptyRecords);
    }
    let (_, header) = &records[0];
    if header.len() < 2 {
        return Err(DecodeError::MissingStation);
    }

    // Upstream headers are inconsistently padded.
    let station_names: Vec<&str> = header[1..].iter().map(|name| name.trim()).collect();

    let mut readings = Vec::new();
    for (line, fields) in &records[1..] {
        if fields.len() != header.len() {
            return Err(DecodeError::RowWidth {
                expected: header.len(),
                found: fields.len(),
            }
            .at_line(*line));
        }

        let timestamp = parse_gauge_time(&fields[0]).map_err(|e| e.at_line(*line))?;

        for (name, cell) in station_names.iter().zip(&fields[1..]) {
            if cell.trim().is_empty() {
                continue;
            }
            let value = Millimeters::from_meters_str(cell).map_err(|e| e.at_line(*line))?;
            readings.push(GroupReading {
                station_name: name.to_string(),
                timestamp,
                value,
            });
        }
    }
    Ok(readings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
