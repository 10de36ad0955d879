//! Run summary and terminal formatting.

use std::time::Duration;

use serde::Serialize;

use crate::domain::{DateRange, FetchMode};

/// Counters collected over one harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestSummary {
    pub categories: usize,
    pub sub_categories: usize,
    /// Catalog listings (categories, sub-categories, series) that failed.
    pub catalog_failures: usize,
    pub series_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub no_data: usize,
    pub failed: usize,
    /// Series entries without a code.
    pub skipped_blank: usize,
    /// Payload rows dropped for an unparseable date.
    pub rows_dropped: usize,
    pub interrupted: bool,
}

/// One-line summary for `--log-format json`.
#[derive(Serialize)]
struct SummaryLine<'a> {
    mode: FetchMode,
    start: String,
    end: String,
    #[serde(flatten)]
    counts: &'a HarvestSummary,
}

pub fn format_summary(summary: &HarvestSummary, mode: FetchMode, range: &DateRange) -> String {
    let mut out = String::new();

    let status = if summary.interrupted {
        "interrupted by user"
    } else {
        "complete"
    };
    out.push_str(&format!("=== evds harvest ({status}) ===\n"));
    out.push_str(&format!(
        "Mode: {} | range {} .. {}\n",
        mode_label(mode),
        range.start_param(),
        range.end_param()
    ));
    out.push_str(&format!(
        "Catalog: {} categories, {} sub-categories, {} listing failures\n",
        summary.categories, summary.sub_categories, summary.catalog_failures
    ));
    out.push_str(&format!(
        "Series: {} seen | {} created | {} updated | {} no data | {} failed\n",
        summary.series_seen, summary.created, summary.updated, summary.no_data, summary.failed
    ));
    if summary.skipped_blank > 0 || summary.rows_dropped > 0 {
        out.push_str(&format!(
            "Skipped: {} entries without code | {} rows with bad dates\n",
            summary.skipped_blank, summary.rows_dropped
        ));
    }

    out
}

pub fn format_summary_json(
    summary: &HarvestSummary,
    mode: FetchMode,
    range: &DateRange,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SummaryLine {
        mode,
        start: range.start_param(),
        end: range.end_param(),
        counts: summary,
    })
}

/// Wall-clock line printed on every exit path.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("Elapsed: {}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("Elapsed: {}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("Elapsed: {:.1}s", elapsed.as_secs_f64())
    }
}

fn mode_label(mode: FetchMode) -> &'static str {
    match mode {
        FetchMode::Full => "full history",
        FetchMode::Recent => "recent window",
    }
}
