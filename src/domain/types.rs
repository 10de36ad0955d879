//! Shared domain types.
//!
//! Everything here is a plain value: catalog entries handed out by the client,
//! the raw tabular payload of one data request, and the normalized
//! observations that end up on disk.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use clap::ValueEnum;
use serde::Serialize;

/// Primary name of the date column, both in payloads and in stored files.
pub const DATE_COLUMN: &str = "Tarih";

/// Alternative date column name some payloads use instead of [`DATE_COLUMN`].
pub const DATE_COLUMN_FALLBACK: &str = "DATE";

/// Date format the remote service expects for range parameters.
pub const REQUEST_DATE_FORMAT: &str = "%d-%m-%Y";

/// Date format written to series files.
pub const STORED_DATE_FORMAT: &str = "%Y-%m-%d";

/// Which date range a harvest run requests for every series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// From the configured epoch up to today.
    Full,
    /// Only the last `--days` days up to today.
    Recent,
}

/// How series files are laid out under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreLayout {
    /// `<root>/<category>/<sub-category>/<code>.csv`
    Nested,
    /// `<root>/<code>.csv`
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Inclusive calendar range sent with every data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Resolve the range for `mode` relative to `today`.
    pub fn for_mode(mode: FetchMode, epoch: NaiveDate, window_days: u32, today: NaiveDate) -> Self {
        let start = match mode {
            FetchMode::Full => epoch.min(today),
            FetchMode::Recent => today
                .checked_sub_days(Days::new(u64::from(window_days)))
                .unwrap_or(NaiveDate::MIN),
        };
        Self { start, end: today }
    }

    pub fn start_param(&self) -> String {
        self.start.format(REQUEST_DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(REQUEST_DATE_FORMAT).to_string()
    }
}

/// Main category as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub title: String,
}

/// Sub-category (data group) inside a main category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCategory {
    pub code: String,
    pub name: String,
}

/// Series listing entry. `code` may be blank in catalog responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEntry {
    pub code: String,
    pub name: String,
}

/// A series together with the catalog names used to place its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRecord {
    pub code: String,
    pub name: String,
    pub category: String,
    pub sub_category: String,
}

/// One dated value. The value is the raw cell text from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: String,
}

/// Normalized two-column payload for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    /// Header of the value column (the identifier-safe series code).
    pub value_column: String,
    /// Observations in payload order (not yet sorted or deduplicated).
    pub observations: Vec<Observation>,
    /// Rows dropped because their date did not parse.
    pub dropped: usize,
}

impl RecordSet {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }
}

/// Untyped table returned by a data request: named columns, string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (`row`, `col`); short rows read as empty cells.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Fully resolved settings for a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub out_dir: PathBuf,
    pub layout: StoreLayout,
    pub mode: FetchMode,
    pub window_days: u32,
    pub epoch: NaiveDate,
    pub delay: Duration,
    pub base_url: String,
    pub timeout: Duration,
}

impl HarvestConfig {
    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        DateRange::for_mode(self.mode, self.epoch, self.window_days, today)
    }
}
