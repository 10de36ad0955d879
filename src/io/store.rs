//! Series file store.
//!
//! One CSV file per series, header `Tarih,<value column>`, ISO dates in
//! ascending order with no date repeated. Every write replaces the whole file
//! through a sibling temporary file and a rename, so a reader never sees a
//! half-written series.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::{
    DATE_COLUMN, DATE_COLUMN_FALLBACK, Observation, RecordSet, STORED_DATE_FORMAT, SeriesRecord, StoreLayout,
};
use crate::io::dates::ValidDates;

const EXTENSION: &str = "csv";
const MAX_SEGMENT_BYTES: usize = 120;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create directory '{}': {source}", path.display())]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("failed to read '{}': {source}", path.display())]
    Read { path: PathBuf, source: csv::Error },

    #[error("failed to write '{}': {source}", path.display())]
    Write { path: PathBuf, source: csv::Error },

    #[error("failed to replace '{}': {source}", path.display())]
    Replace { path: PathBuf, source: std::io::Error },

    #[error("'{}' has no date column", path.display())]
    MalformedFile { path: PathBuf },

    #[error("'{}' is already used by series {claimed_by}; refusing to merge {code} into it", path.display())]
    PathCollision {
        path: PathBuf,
        claimed_by: String,
        code: String,
    },
}

/// What a merge did to the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Nothing to merge; the file was not touched.
    NoNewData,
    /// The file did not exist and now holds `rows` observations.
    Created { rows: usize },
    /// The file was rewritten; it held `previous` rows and now holds `rows`.
    Updated { rows: usize, previous: usize },
}

/// Observations read back from a series file.
#[derive(Debug, Clone)]
pub struct StoredSeries {
    pub value_column: String,
    pub observations: Vec<Observation>,
    /// Rows whose date no longer parses.
    pub dropped: usize,
}

/// Output root plus the per-run table of which series owns which file.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    layout: StoreLayout,
    claims: HashMap<PathBuf, String>,
}

impl Store {
    /// Open (and create if needed) the output root.
    pub fn open(root: impl Into<PathBuf>, layout: StoreLayout) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            layout,
            claims: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that holds `series` under this store's layout.
    pub fn path_for(&self, series: &SeriesRecord) -> PathBuf {
        let file = format!("{}.{EXTENSION}", sanitize_segment(&series.code));
        match self.layout {
            StoreLayout::Flat => self.root.join(file),
            StoreLayout::Nested => self
                .root
                .join(sanitize_segment(&series.category))
                .join(sanitize_segment(&series.sub_category))
                .join(file),
        }
    }

    /// Merge `incoming` into the file for `series`.
    ///
    /// A path already written for a different series code during this run is
    /// refused instead of silently mixing two series in one file.
    pub fn persist(&mut self, series: &SeriesRecord, incoming: Option<&RecordSet>) -> Result<WriteOutcome, StoreError> {
        let Some(incoming) = incoming.filter(|set| !set.is_empty()) else {
            return Ok(WriteOutcome::NoNewData);
        };

        let path = self.path_for(series);
        if let Some(claimed_by) = self.claims.get(&path) {
            if *claimed_by != series.code {
                return Err(StoreError::PathCollision {
                    path,
                    claimed_by: claimed_by.clone(),
                    code: series.code.clone(),
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let outcome = merge_and_persist(&path, Some(incoming))?;
        self.claims.insert(path, series.code.clone());
        Ok(outcome)
    }
}

/// Read-merge-write `incoming` into the series file at `path`.
///
/// Existing rows go in first and incoming rows second, so on a shared date the
/// freshly fetched value replaces the stored one. The parent directory must
/// exist.
pub fn merge_and_persist(path: &Path, incoming: Option<&RecordSet>) -> Result<WriteOutcome, StoreError> {
    let Some(incoming) = incoming.filter(|set| !set.is_empty()) else {
        return Ok(WriteOutcome::NoNewData);
    };

    if !path.exists() {
        let merged = merge(Vec::new(), &incoming.observations);
        let rows = merged.len();
        write_series(path, &incoming.value_column, &merged)?;
        return Ok(WriteOutcome::Created { rows });
    }

    let existing = read_series(path)?;
    if existing.dropped > 0 {
        tracing::debug!(
            path = %path.display(),
            dropped = existing.dropped,
            "stored rows with unparseable dates discarded"
        );
    }
    let previous = existing.observations.len();
    let merged = merge(existing.observations, &incoming.observations);
    let rows = merged.len();
    write_series(path, &incoming.value_column, &merged)?;
    Ok(WriteOutcome::Updated { rows, previous })
}

/// Combine two observation batches into one ascending, date-unique sequence.
///
/// For a date present more than once the last occurrence wins: any row of
/// `incoming` beats `existing`, and later rows beat earlier ones within a batch.
pub fn merge(existing: Vec<Observation>, incoming: &[Observation]) -> Vec<Observation> {
    let mut by_date = BTreeMap::new();
    for obs in existing.into_iter().chain(incoming.iter().cloned()) {
        by_date.insert(obs.date, obs.value);
    }
    by_date
        .into_iter()
        .map(|(date, value)| Observation { date, value })
        .collect()
}

/// Load a series file, re-validating every date.
pub fn read_series(path: &Path) -> Result<StoredSeries, StoreError> {
    let read_err = |source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(read_err)?;

    let headers = reader.headers().map_err(read_err)?.clone();
    let names: Vec<&str> = headers.iter().map(|h| h.trim().trim_start_matches('\u{feff}')).collect();
    let date_idx = names
        .iter()
        .position(|h| *h == DATE_COLUMN)
        .or_else(|| names.iter().position(|h| *h == DATE_COLUMN_FALLBACK))
        .ok_or_else(|| StoreError::MalformedFile {
            path: path.to_path_buf(),
        })?;
    let value_idx = (0..names.len()).find(|&idx| idx != date_idx);
    let value_column = value_idx
        .and_then(|idx| names.get(idx))
        .map(|name| name.to_string())
        .unwrap_or_default();

    let mut cells = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_err)?;
        let date = record.get(date_idx).unwrap_or("").to_string();
        let value = value_idx.and_then(|idx| record.get(idx)).unwrap_or("").to_string();
        cells.push((date, value));
    }

    let mut valid = ValidDates::new(cells.into_iter());
    let observations: Vec<_> = valid.by_ref().collect();
    Ok(StoredSeries {
        value_column,
        observations,
        dropped: valid.dropped(),
    })
}

/// Write to `<file>.tmp` and rename over `path`. The temporary file is
/// removed whenever either step fails.
fn write_series(path: &Path, value_column: &str, observations: &[Observation]) -> Result<(), StoreError> {
    let tmp = temp_path(path);
    let written = write_rows(&tmp, value_column, observations)
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|()| {
            fs::rename(&tmp, path).map_err(|source| StoreError::Replace {
                path: path.to_path_buf(),
                source,
            })
        });

    if written.is_err() && tmp.exists() {
        if let Err(err) = fs::remove_file(&tmp) {
            tracing::debug!(path = %tmp.display(), error = %err, "could not remove temporary file");
        }
    }
    written
}

fn write_rows(tmp: &Path, value_column: &str, observations: &[Observation]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(tmp)?;
    writer.write_record([DATE_COLUMN, value_column])?;
    for obs in observations {
        let date = obs.date.format(STORED_DATE_FORMAT).to_string();
        writer.write_record([date.as_str(), obs.value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Make a catalog name usable as a single file or directory name.
///
/// Removes path separators, characters reserved on common filesystems and
/// control characters, collapses whitespace, trims leading/trailing dots and
/// spaces, and caps the length. An empty result becomes `_`.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == ' ');

    let mut end = trimmed.len().min(MAX_SEGMENT_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let capped = trimmed[..end].trim_end_matches(|c: char| c == '.' || c == ' ');

    if capped.is_empty() {
        "_".to_string()
    } else {
        capped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn set(rows: &[(NaiveDate, &str)]) -> RecordSet {
        RecordSet {
            value_column: "TP_DK_USD_A".to_string(),
            observations: rows
                .iter()
                .map(|(date, value)| Observation {
                    date: *date,
                    value: value.to_string(),
                })
                .collect(),
            dropped: 0,
        }
    }

    fn record(code: &str, category: &str, sub: &str) -> SeriesRecord {
        SeriesRecord {
            code: code.to_string(),
            name: String::new(),
            category: category.to_string(),
            sub_category: sub.to_string(),
        }
    }

    #[test]
    fn creates_file_in_date_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TP.DK.USD.A.csv");
        let incoming = set(&[(d(2021, 1, 3), "8.1"), (d(2021, 1, 1), "7.5")]);

        let outcome = merge_and_persist(&path, Some(&incoming)).unwrap();

        assert_eq!(outcome, WriteOutcome::Created { rows: 2 });
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Tarih,TP_DK_USD_A\n2021-01-01,7.5\n2021-01-03,8.1\n"
        );
    }

    #[test]
    fn update_keeps_incoming_value_on_shared_date() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        merge_and_persist(&path, Some(&set(&[(d(2021, 1, 1), "7.5"), (d(2021, 1, 2), "7.8")]))).unwrap();

        let outcome =
            merge_and_persist(&path, Some(&set(&[(d(2021, 1, 2), "7.9"), (d(2021, 1, 4), "8.0")]))).unwrap();

        assert_eq!(outcome, WriteOutcome::Updated { rows: 3, previous: 2 });
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Tarih,TP_DK_USD_A\n2021-01-01,7.5\n2021-01-02,7.9\n2021-01-04,8.0\n"
        );
    }

    #[test]
    fn repeated_merge_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        merge_and_persist(&path, Some(&set(&[(d(2020, 5, 1), "1"), (d(2020, 6, 1), "2")]))).unwrap();
        let incoming = set(&[(d(2020, 6, 1), "2.5"), (d(2020, 7, 1), "3")]);

        merge_and_persist(&path, Some(&incoming)).unwrap();
        let once = fs::read(&path).unwrap();
        merge_and_persist(&path, Some(&incoming)).unwrap();
        let twice = fs::read(&path).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn empty_incoming_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        fs::write(&path, "Tarih,X\n01-01-2021,1\n").unwrap();

        assert_eq!(merge_and_persist(&path, None).unwrap(), WriteOutcome::NoNewData);
        assert_eq!(merge_and_persist(&path, Some(&set(&[]))).unwrap(), WriteOutcome::NoNewData);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Tarih,X\n01-01-2021,1\n");
    }

    #[test]
    fn empty_incoming_does_not_create_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        assert_eq!(merge_and_persist(&path, None).unwrap(), WriteOutcome::NoNewData);
        assert!(!path.exists());
    }

    #[test]
    fn dates_stay_sorted_and_unique_across_merges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        let batches = [
            set(&[(d(2022, 3, 1), "a"), (d(2022, 1, 1), "b")]),
            set(&[(d(2021, 12, 1), "c"), (d(2022, 3, 1), "d"), (d(2022, 3, 1), "e")]),
            set(&[(d(2022, 2, 1), "f"), (d(2021, 12, 1), "g")]),
        ];
        for batch in &batches {
            merge_and_persist(&path, Some(batch)).unwrap();
        }

        let stored = read_series(&path).unwrap();
        let dates: Vec<_> = stored.observations.iter().map(|o| o.date).collect();
        assert!(dates.windows(2).all(|w| w[0] < w[1]), "{dates:?}");
        let values: Vec<_> = stored.observations.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, ["g", "b", "f", "e"]);
    }

    #[test]
    fn legacy_day_first_rows_are_rewritten_and_bad_rows_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        fs::write(&path, "Tarih,TP_DK_USD_A\n02-01-2021,7.8\nbroken,0\n01-01-2021,7.5\n").unwrap();

        let outcome = merge_and_persist(&path, Some(&set(&[(d(2021, 1, 3), "8.1")]))).unwrap();

        assert_eq!(outcome, WriteOutcome::Updated { rows: 3, previous: 2 });
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Tarih,TP_DK_USD_A\n2021-01-01,7.5\n2021-01-02,7.8\n2021-01-03,8.1\n"
        );
    }

    #[test]
    fn file_without_date_column_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        fs::write(&path, "when,value\n2021-01-01,1\n").unwrap();

        let err = merge_and_persist(&path, Some(&set(&[(d(2021, 1, 3), "8.1")]))).unwrap_err();
        assert!(matches!(err, StoreError::MalformedFile { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "when,value\n2021-01-01,1\n");
    }

    #[test]
    fn values_with_commas_survive_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.csv");
        merge_and_persist(&path, Some(&set(&[(d(2021, 1, 1), "1,5")]))).unwrap();
        let stored = read_series(&path).unwrap();
        assert_eq!(stored.observations[0].value, "1,5");
        assert_eq!(stored.value_column, "TP_DK_USD_A");
    }

    #[test]
    fn nested_layout_builds_sanitized_path() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), StoreLayout::Nested).unwrap();
        let path = store.path_for(&record("TP.DK.USD.A", "Kurlar / Döviz", "Günlük: A*B"));
        assert_eq!(
            path,
            dir.path().join("Kurlar Döviz").join("Günlük AB").join("TP.DK.USD.A.csv")
        );
    }

    #[test]
    fn flat_layout_uses_code_only() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), StoreLayout::Flat).unwrap();
        let path = store.path_for(&record("TP.DK.USD.A", "x", "y"));
        assert_eq!(path, dir.path().join("TP.DK.USD.A.csv"));
    }

    #[test]
    fn persist_creates_directories() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path().join("out"), StoreLayout::Nested).unwrap();
        let series = record("TP.A", "Cat", "Sub");

        let outcome = store.persist(&series, Some(&set(&[(d(2021, 1, 1), "1")]))).unwrap();

        assert_eq!(outcome, WriteOutcome::Created { rows: 1 });
        assert!(dir.path().join("out/Cat/Sub/TP.A.csv").is_file());
    }

    #[test]
    fn colliding_series_are_refused() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path(), StoreLayout::Flat).unwrap();
        let rows = set(&[(d(2021, 1, 1), "1")]);

        store.persist(&record("TP:A", "c", "s"), Some(&rows)).unwrap();
        let err = store.persist(&record("TP*A", "c", "s"), Some(&rows)).unwrap_err();

        assert!(matches!(err, StoreError::PathCollision { ref claimed_by, .. } if claimed_by == "TP:A"));
        // The same series may be written again.
        store.persist(&record("TP:A", "c", "s"), Some(&rows)).unwrap();
    }

    #[test]
    fn failed_replace_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        // A non-empty directory where the series file should go makes the
        // final rename fail after the rows were written.
        let path = dir.path().join("TP.DK.USD.A.csv");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let rows = set(&[(d(2021, 1, 1), "7.5")]);
        let err = write_series(&path, &rows.value_column, &rows.observations).unwrap_err();

        assert!(matches!(err, StoreError::Replace { .. }));
        assert!(!temp_path(&path).exists());
        assert!(path.join("keep").is_file());
    }

    #[test]
    fn sanitize_segment_edge_cases() {
        assert_eq!(sanitize_segment("  a/b\\c  "), "abc");
        assert_eq!(sanitize_segment("..hidden.."), "hidden");
        assert_eq!(sanitize_segment("tab\there"), "tab here");
        assert_eq!(sanitize_segment("???"), "_");
        assert_eq!(sanitize_segment(""), "_");

        let long = "ş".repeat(100);
        let capped = sanitize_segment(&long);
        assert!(capped.len() <= MAX_SEGMENT_BYTES);
        assert!(capped.chars().all(|c| c == 'ş'));
    }
}
