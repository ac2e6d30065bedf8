// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Calendar walking.
//!
//! A backfill run covers an inclusive range of UTC calendar dates. The
//! [`CalendarWalk`] iterator visits that range one day at a time, in
//! ascending order. Dates carry no time component, so month rollover, year
//! rollover, and leap days are handled entirely by [`NaiveDate`].
//!
//! A range whose start lies after its end is not an error. It simply walks
//! zero days, which makes the whole run a no-op.

use chrono::NaiveDate;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    iter::FusedIterator,
};

/// Inclusive range of UTC calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Construct new date range.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Check if range walks zero days.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Exact number of days the range covers.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }

        (self.end - self.start).num_days() as usize + 1
    }

    /// Walk the range one day at a time.
    pub fn walk(&self) -> CalendarWalk {
        walk(self.start, self.end)
    }
}

impl Display for DateRange {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}..={}", self.start, self.end)
    }
}

impl IntoIterator for DateRange {
    type Item = NaiveDate;
    type IntoIter = CalendarWalk;

    fn into_iter(self) -> Self::IntoIter {
        self.walk()
    }
}

/// Walk inclusive date range from `start` to `end`.
pub fn walk(start: NaiveDate, end: NaiveDate) -> CalendarWalk {
    CalendarWalk {
        cursor: Some(start),
        end,
    }
}

/// Lazy cursor over an inclusive range of calendar dates.
///
/// Cloning the walk clones its cursor, so a walk can be restarted from any
/// point it has reached.
#[derive(Debug, Clone)]
pub struct CalendarWalk {
    cursor: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for CalendarWalk {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor.filter(|date| *date <= self.end)?;

        // INVARIANT: Saturate at the end of chrono's representable calendar.
        self.cursor = current.succ_opt();
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.cursor {
            Some(date) if date <= self.end => (self.end - date).num_days() as usize + 1,
            _ => 0,
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CalendarWalk {}

impl FusedIterator for CalendarWalk {}
