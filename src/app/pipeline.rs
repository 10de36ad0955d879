//! Harvest loop shared by the `harvest` and `series` commands.
//!
//! fetch -> normalize -> merge/persist, one series at a time, with a fixed
//! pause between data requests. A failure is confined to the catalog branch or
//! series it happened in; only cancellation ends the loop early.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::{CatalogClient, FetchError};
use crate::domain::{Category, DateRange, SeriesRecord, SubCategory};
use crate::error::AppError;
use crate::io::{NormalizeError, Store, StoreError, WriteOutcome, normalize};
use crate::report::{HarvestSummary, format_elapsed};

/// Longest uninterrupted sleep while pacing, so cancellation stays responsive.
const PACE_SLICE: Duration = Duration::from_millis(50);

/// Polled between catalog entries and while pacing.
pub trait RunControl {
    fn should_cancel(&self) -> bool;
}

impl RunControl for AtomicBool {
    fn should_cancel(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Shared cancellation flag, set from the Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// First Ctrl-C asks the loop to stop after the current series; a second
    /// one prints the elapsed time since `started` and exits with 130. Files
    /// are replaced by rename, so neither leaves a partial file behind.
    pub fn install_ctrlc(&self, started: Instant) -> Result<(), AppError> {
        let flag = Arc::clone(&self.0);
        ctrlc::set_handler(move || {
            if let Some(line) = record_interrupt(&flag, started) {
                println!("{line}");
                std::process::exit(130);
            }
        })
        .map_err(|e| AppError::setup(format!("Failed to install Ctrl-C handler: {e}")))
    }
}

/// Set the flag for one Ctrl-C. On a repeated press, returns the elapsed
/// line to print before exiting.
fn record_interrupt(flag: &AtomicBool, started: Instant) -> Option<String> {
    flag.swap(true, Ordering::SeqCst)
        .then(|| format_elapsed(started.elapsed()))
}

impl RunControl for CancelFlag {
    fn should_cancel(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why one series was skipped.
#[derive(Debug, Error)]
pub enum SeriesFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Normalize(#[from] NormalizeError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

/// Result of processing one series.
#[derive(Debug)]
pub enum SeriesOutcome {
    Written(WriteOutcome),
    NoData,
    Failed(SeriesFailure),
}

pub struct Harvester<'a, C, R> {
    client: &'a C,
    store: Store,
    range: DateRange,
    delay: Duration,
    control: &'a R,
    /// When the previous series finished (fetch, normalize and write).
    last_finished: Option<Instant>,
    summary: HarvestSummary,
}

impl<'a, C, R> Harvester<'a, C, R>
where
    C: CatalogClient,
    R: RunControl,
{
    pub fn new(client: &'a C, store: Store, range: DateRange, delay: Duration, control: &'a R) -> Self {
        Self {
            client,
            store,
            range,
            delay,
            control,
            last_finished: None,
            summary: HarvestSummary::default(),
        }
    }

    /// Walk the whole catalog: categories, their sub-categories, their series.
    pub fn run(mut self) -> HarvestSummary {
        let categories = match self.client.categories() {
            Ok(categories) => categories,
            Err(err) => {
                warn!(error = %err, "category listing failed");
                self.summary.catalog_failures += 1;
                return self.summary;
            }
        };
        info!(count = categories.len(), "categories listed");

        for category in &categories {
            if self.harvest_category(category).is_break() {
                break;
            }
        }
        self.summary
    }

    /// Harvest an explicit list of series, skipping the catalog walk.
    pub fn run_series(mut self, records: &[SeriesRecord]) -> HarvestSummary {
        for record in records {
            if record.code.trim().is_empty() {
                self.summary.skipped_blank += 1;
                continue;
            }
            if self.harvest_series(record).is_break() {
                break;
            }
        }
        self.summary
    }

    fn harvest_category(&mut self, category: &Category) -> ControlFlow<()> {
        self.check_cancel()?;
        self.summary.categories += 1;
        info!(id = %category.id, title = %category.title, "category");

        let sub_categories = match self.client.sub_categories(&category.id) {
            Ok(subs) => subs,
            Err(err) => {
                warn!(id = %category.id, error = %err, "sub-category listing failed, skipping category");
                self.summary.catalog_failures += 1;
                return ControlFlow::Continue(());
            }
        };

        for sub in &sub_categories {
            self.harvest_sub_category(category, sub)?;
        }
        ControlFlow::Continue(())
    }

    fn harvest_sub_category(&mut self, category: &Category, sub: &SubCategory) -> ControlFlow<()> {
        self.check_cancel()?;
        self.summary.sub_categories += 1;

        let entries = match self.client.series(&sub.code) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(code = %sub.code, error = %err, "series listing failed, skipping sub-category");
                self.summary.catalog_failures += 1;
                return ControlFlow::Continue(());
            }
        };
        info!(code = %sub.code, name = %sub.name, series = entries.len(), "sub-category");

        for entry in entries {
            let code = entry.code.trim();
            if code.is_empty() {
                self.summary.skipped_blank += 1;
                continue;
            }
            let record = SeriesRecord {
                code: code.to_string(),
                name: entry.name,
                category: category.title.clone(),
                sub_category: sub.name.clone(),
            };
            self.harvest_series(&record)?;
        }
        ControlFlow::Continue(())
    }

    fn harvest_series(&mut self, record: &SeriesRecord) -> ControlFlow<()> {
        if !self.pace() {
            self.summary.interrupted = true;
            return ControlFlow::Break(());
        }

        let outcome = self.fetch_and_store(record);
        self.last_finished = Some(Instant::now());
        self.summary.series_seen += 1;
        match &outcome {
            SeriesOutcome::Written(WriteOutcome::Created { rows }) => {
                self.summary.created += 1;
                info!(code = %record.code, rows, path = %self.store.path_for(record).display(), "created");
            }
            SeriesOutcome::Written(WriteOutcome::Updated { rows, previous }) => {
                self.summary.updated += 1;
                info!(code = %record.code, rows, previous, "updated");
            }
            SeriesOutcome::Written(WriteOutcome::NoNewData) | SeriesOutcome::NoData => {
                self.summary.no_data += 1;
                debug!(code = %record.code, "no new data");
            }
            SeriesOutcome::Failed(err) => {
                self.summary.failed += 1;
                warn!(code = %record.code, error = %err, "series skipped");
            }
        }
        ControlFlow::Continue(())
    }

    fn fetch_and_store(&mut self, record: &SeriesRecord) -> SeriesOutcome {
        let raw = match self.client.observations(&record.code, &self.range) {
            Ok(raw) => raw,
            Err(err) => return SeriesOutcome::Failed(err.into()),
        };

        let records = match normalize(raw.as_ref(), &record.code) {
            Ok(Some(records)) => records,
            Ok(None) => return SeriesOutcome::NoData,
            Err(err) => return SeriesOutcome::Failed(err.into()),
        };
        if records.dropped > 0 {
            debug!(code = %record.code, dropped = records.dropped, "rows with unparseable dates dropped");
            self.summary.rows_dropped += records.dropped;
        }

        match self.store.persist(record, Some(&records)) {
            Ok(WriteOutcome::NoNewData) => SeriesOutcome::NoData,
            Ok(outcome) => SeriesOutcome::Written(outcome),
            Err(err) => SeriesOutcome::Failed(err.into()),
        }
    }

    fn check_cancel(&mut self) -> ControlFlow<()> {
        if self.control.should_cancel() {
            self.summary.interrupted = true;
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Sleep until `delay` has passed since the previous series finished, so
    /// a slow fetch or write never eats into the pause.
    /// Returns `false` if cancelled before or while waiting.
    fn pace(&self) -> bool {
        loop {
            if self.control.should_cancel() {
                return false;
            }
            let Some(last) = self.last_finished else {
                return true;
            };
            let waited = last.elapsed();
            if waited >= self.delay {
                return true;
            }
            std::thread::sleep((self.delay - waited).min(PACE_SLICE));
        }
    }
}
