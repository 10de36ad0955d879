//! Observation date parsing.
//!
//! Payload dates are day-first (`DD-MM-YYYY`), but low-frequency series arrive
//! as `YYYY-M`, `YYYY-Qn` or a bare `YYYY`, and stored files use ISO dates. A
//! leading four-digit group selects the year-first shapes; everything else is
//! read day-first. Two-digit years are rejected.

use chrono::NaiveDate;

use crate::domain::Observation;

/// Parse one date cell. Returns `None` for anything unrecognised.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_start_matches('\u{feff}');
    // Drop a time-of-day suffix ("2021-01-04 00:00:00", "2021-01-04T00:00:00").
    let s = s.split_once([' ', 'T']).map_or(s, |(date, _)| date);
    if s.is_empty() {
        return None;
    }

    let leading_digits = s.chars().take_while(char::is_ascii_digit).count();
    if leading_digits == 4 {
        parse_year_first(s)
    } else {
        parse_day_first(s)
    }
}

fn parse_day_first(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split(['-', '/', '.']);
    let day = parts.next()?;
    let month = parts.next()?;
    let year = parts.next()?;
    if parts.next().is_some() || year.len() != 4 {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn parse_year_first(s: &str) -> Option<NaiveDate> {
    let year: i32 = s.get(..4)?.parse().ok()?;
    let rest = &s[4..];
    if rest.is_empty() {
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }

    let rest = rest.strip_prefix(['-', '/', '.'])?;
    if let Some(quarter) = rest.strip_prefix(['Q', 'q']) {
        let quarter: u32 = quarter.parse().ok()?;
        if !(1..=4).contains(&quarter) {
            return None;
        }
        return NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1);
    }

    let mut parts = rest.split(['-', '/', '.']);
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = match parts.next() {
        Some(day) => day.parse().ok()?,
        None => 1,
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Lazily turns `(date cell, value cell)` pairs into [`Observation`]s,
/// skipping rows whose date does not parse and counting them.
pub struct ValidDates<I> {
    inner: I,
    dropped: usize,
}

impl<I> ValidDates<I> {
    pub fn new(inner: I) -> Self {
        Self { inner, dropped: 0 }
    }

    /// Rows skipped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl<I, S> Iterator for ValidDates<I>
where
    I: Iterator<Item = (S, String)>,
    S: AsRef<str>,
{
    type Item = Observation;

    fn next(&mut self) -> Option<Observation> {
        while let Some((raw, value)) = self.inner.next() {
            match parse_date(raw.as_ref()) {
                Some(date) => return Some(Observation { date, value }),
                None => self.dropped += 1,
            }
        }
        None
    }
}
