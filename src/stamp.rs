// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Timestamp synthesis.
//!
//! Each synthetic commit gets a uniformly random second inside its UTC
//! calendar day. The resulting instant is used verbatim as both the author
//! time and the committer time of the commit.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::Rng;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Number of seconds in one UTC day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Canonical textual layout of a [`Stamp`].
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Absolute instant of a synthetic commit with whole second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(DateTime<Utc>);

impl Stamp {
    /// Construct stamp from seconds since the Unix epoch.
    pub fn from_unix(seconds: i64) -> Option<Self> {
        Utc.timestamp_opt(seconds, 0).single().map(Self)
    }

    /// UTC midnight at the start of `date`.
    pub fn midnight(date: NaiveDate) -> Self {
        Self(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }

    /// UTC midnights bounding `date` as a half-open window.
    pub fn day_bounds(date: NaiveDate) -> (Self, Self) {
        let Stamp(start) = Self::midnight(date);
        (Self(start), Self(start + Duration::days(1)))
    }

    /// Current wall clock time.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Seconds since the Unix epoch.
    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// UTC calendar date the stamp falls on.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Treat stamp as a [`DateTime`].
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Stamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::from_unix(datetime.timestamp()).unwrap_or(Self(datetime))
    }
}

impl Display for Stamp {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.0.format(STAMP_FORMAT))
    }
}

impl FromStr for Stamp {
    type Err = chrono::ParseError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let naive = chrono::NaiveDateTime::parse_from_str(data, STAMP_FORMAT)?;
        Ok(Self(Utc.from_utc_datetime(&naive)))
    }
}

/// Synthesize random instant inside UTC calendar day `date`.
///
/// Picks a uniform second-of-day offset in `[0, 86399]` and adds it to the
/// UTC midnight of `date`.
pub fn synthesize(date: NaiveDate, rng: &mut impl Rng) -> Stamp {
    let offset = rng.gen_range(0..SECONDS_PER_DAY);
    let Stamp(midnight) = Stamp::midnight(date);
    Stamp(midnight + Duration::seconds(offset))
}
