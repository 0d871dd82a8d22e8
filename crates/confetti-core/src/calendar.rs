//! Working-day rules.
//!
//! A working day is any date that is neither a Saturday, a Sunday, nor in the
//! configured [`HolidaySet`]. Dates are always compared as absolute calendar
//! dates so a holiday set spanning New Year is consulted correctly.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::HolidayError;

/// A set of non-working calendar dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidaySet {
    dates: BTreeSet<NaiveDate>,
}

impl HolidaySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn insert(&mut self, date: NaiveDate) -> bool {
        self.dates.insert(date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.iter()
    }

    /// Parse a JSON array of ISO dates (`["2025-12-25", ...]`).
    ///
    /// Entries carrying a time component (`2025-12-25T00:00:00Z`) keep only
    /// the date part.
    pub fn from_json(json: &str) -> Result<Self, HolidayError> {
        let entries: Vec<String> = serde_json::from_str(json)?;
        entries
            .iter()
            .map(|entry| {
                let date_part = entry.split('T').next().unwrap_or(entry).trim();
                NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                    .map_err(|_| HolidayError::InvalidDate(entry.clone()))
            })
            .collect()
    }
}

impl FromIterator<NaiveDate> for HolidaySet {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        Self {
            dates: iter.into_iter().collect(),
        }
    }
}

/// True on weekends and holidays.
pub fn is_non_working_day(date: NaiveDate, holidays: &HolidaySet) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || holidays.contains(date)
}

/// The latest working day on or before `date`.
pub fn previous_working_day(date: NaiveDate, holidays: &HolidaySet) -> NaiveDate {
    let mut current = date;
    while is_non_working_day(current, holidays) {
        match current.pred_opt() {
            Some(prev) => current = prev,
            None => break,
        }
    }
    current
}

/// Walk back from `date`, counting only working days, until `n` have passed.
///
/// `subtract_working_days(d, 0, _) == d` for every `d`, working day or not.
pub fn subtract_working_days(date: NaiveDate, n: u32, holidays: &HolidaySet) -> NaiveDate {
    let mut current = date;
    let mut remaining = n;
    while remaining > 0 {
        match current.pred_opt() {
            Some(prev) => current = prev,
            None => break,
        }
        if !is_non_working_day(current, holidays) {
            remaining -= 1;
        }
    }
    current
}
