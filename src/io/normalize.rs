//! Payload normalization.
//!
//! Turns the raw table returned for one series into a two-column
//! [`RecordSet`]: the date column plus the first value column, renamed to an
//! identifier-safe form of the series code.
//!
//! - **Column-level problems** (no date column, no value column) reject the
//!   payload for this series only.
//! - **Row-level problems** (a date that does not parse) drop the row and are
//!   counted, never reported as errors.

use thiserror::Error;

use crate::domain::{DATE_COLUMN, DATE_COLUMN_FALLBACK, RawTable, RecordSet};
use crate::io::dates::ValidDates;

/// Why a non-empty payload could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("{code}: payload has no `Tarih` or `DATE` column")]
    MissingDateColumn { code: String },

    #[error("{code}: payload has no value column")]
    MissingValueColumn { code: String },

    #[error("{code}: none of {dropped} rows has a parseable date")]
    NoValidRows { code: String, dropped: usize },
}

/// Normalize one payload for series `code`.
///
/// `Ok(None)` means the service had nothing for the requested range.
pub fn normalize(raw: Option<&RawTable>, code: &str) -> Result<Option<RecordSet>, NormalizeError> {
    let Some(raw) = raw.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    let headers: Vec<&str> = raw.columns.iter().map(|c| normalize_header_name(c)).collect();

    let date_idx = headers
        .iter()
        .position(|h| *h == DATE_COLUMN)
        .or_else(|| headers.iter().position(|h| *h == DATE_COLUMN_FALLBACK))
        .ok_or_else(|| NormalizeError::MissingDateColumn {
            code: code.to_string(),
        })?;

    let value_idx = (0..headers.len())
        .find(|&idx| idx != date_idx)
        .ok_or_else(|| NormalizeError::MissingValueColumn {
            code: code.to_string(),
        })?;

    let cells = (0..raw.rows.len()).map(|row| (raw.cell(row, date_idx), raw.cell(row, value_idx).to_string()));
    let mut valid = ValidDates::new(cells);
    let observations: Vec<_> = valid.by_ref().collect();
    let dropped = valid.dropped();

    if observations.is_empty() {
        return Err(NormalizeError::NoValidRows {
            code: code.to_string(),
            dropped,
        });
    }

    Ok(Some(RecordSet {
        value_column: value_column_name(code),
        observations,
        dropped,
    }))
}

/// Column header used for a series' values: periods (the code separator)
/// become underscores, e.g. `TP.DK.USD.A` -> `TP_DK_USD_A`.
pub fn value_column_name(code: &str) -> String {
    code.trim().replace('.', "_")
}

fn normalize_header_name(name: &str) -> &str {
    // UTF-8 exports sometimes carry a BOM on the first header.
    name.trim().trim_start_matches('\u{feff}')
}
