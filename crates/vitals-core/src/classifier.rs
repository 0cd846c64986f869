//! Line classifier: raw text record -> typed telemetry event
//!
//! Wire grammar, one record per line:
//!
//! ```text
//! record := "S:" INT "," INT      (spo2, heart rate)
//!         | DECIMAL               (ECG sample)
//! ```
//!
//! Classification is a pure function. Rejected lines never reach consumers.

use crate::clock::LocalTimestamp;
use crate::error::ParseError;
use crate::telemetry::TelemetryEvent;

/// Prefix marking an SpO2 / heart-rate record
pub const VITALS_PREFIX: &str = "S:";

/// Classify one line, reporting why it was rejected
pub fn classify_line(
    line: &str,
    received_at: LocalTimestamp,
) -> Result<TelemetryEvent, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::EmptyLine);
    }

    if let Some(body) = line.strip_prefix(VITALS_PREFIX) {
        let (spo2, heart_rate) = parse_vitals_fields(body)?;
        return Ok(TelemetryEvent::vitals(spo2, heart_rate, received_at));
    }

    match line.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(TelemetryEvent::ecg(value, received_at)),
        _ => Err(ParseError::InvalidSample {
            line: line.to_string(),
        }),
    }
}

/// Classify one line, dropping anything that does not parse
pub fn classify(line: &str, received_at: LocalTimestamp) -> Option<TelemetryEvent> {
    classify_line(line, received_at).ok()
}

/// Split a payload into trimmed, non-empty records in wire order
///
/// `\n`, `\r\n` and a bare `\r` all end a record.
pub fn split_records(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Classify every record in a multi-line payload, keeping wire order
pub fn classify_payload(payload: &str, received_at: LocalTimestamp) -> Vec<TelemetryEvent> {
    split_records(payload)
        .filter_map(|line| classify(line, received_at))
        .collect()
}

/// Parse the `INT,INT` body of a vitals record
pub fn parse_vitals_fields(body: &str) -> Result<(i32, i32), ParseError> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != 2 {
        return Err(ParseError::FieldCount {
            found: fields.len(),
        });
    }

    let parse_int = |field: &str| {
        field
            .trim()
            .parse::<i32>()
            .map_err(|_| ParseError::InvalidInteger {
                field: field.to_string(),
            })
    };

    Ok((parse_int(fields[0])?, parse_int(fields[1])?))
}
