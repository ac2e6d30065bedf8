// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Daily commit targets.
//!
//! Every calendar day of a backfill run receives a target commit count drawn
//! uniformly from the configured `[min, max]` bounds. How many commits are
//! actually needed for that day depends on the [`ScheduleMode`].
//!
//! # Scheduling Modes
//!
//! In __existing-aware__ mode the target is net of commits the configured
//! author already has on that UTC day. Re-running a backfill over the same
//! range therefore tops up under-provisioned days instead of duplicating
//! work. In __always-fresh__ mode the whole target is emitted every time.

use crate::{
    identity::Identity,
    repo::VersionControl,
    stamp::Stamp,
};

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Policy deciding whether existing commits count toward the daily target.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleMode {
    /// Subtract commits already present on the day from its target.
    #[default]
    ExistingAware,

    /// Ignore existing commits entirely.
    AlwaysFresh,
}

/// Commit plan for a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub existing: usize,
    pub target: usize,
    pub need: usize,
}

impl DayPlan {
    /// Construct new day plan under given scheduling mode.
    pub fn new(date: NaiveDate, existing: usize, target: usize, mode: ScheduleMode) -> Self {
        let need = match mode {
            ScheduleMode::ExistingAware => target.saturating_sub(existing),
            ScheduleMode::AlwaysFresh => target,
        };

        Self {
            date,
            existing,
            target,
            need,
        }
    }

    /// Check if the day needs no new commits.
    pub fn is_satisfied(&self) -> bool {
        self.need == 0
    }
}

/// Sample uniformly from `[min, max]` inclusive.
///
/// # Panics
///
/// - Will panic if `min > max`. Run configuration validation rules this out.
pub fn sample(min: u32, max: u32, rng: &mut impl Rng) -> u32 {
    rng.gen_range(min..=max)
}

/// Plans how many commits each day needs.
#[derive(Debug, Clone)]
pub struct Scheduler {
    min_daily: u32,
    max_daily: u32,
    mode: ScheduleMode,
    author: Identity,
}

impl Scheduler {
    /// Construct new scheduler.
    ///
    /// Existing commits are only counted when they belong to `author`.
    pub fn new(min_daily: u32, max_daily: u32, mode: ScheduleMode, author: Identity) -> Self {
        Self {
            min_daily,
            max_daily,
            mode,
            author,
        }
    }

    /// Scheduling mode in use.
    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Plan commits for `date`.
    ///
    /// Existing commits are only queried in existing-aware mode.
    pub fn plan(&self, vcs: &impl VersionControl, date: NaiveDate, rng: &mut impl Rng) -> DayPlan {
        let existing = match self.mode {
            ScheduleMode::ExistingAware => self.count_existing(vcs, date),
            ScheduleMode::AlwaysFresh => 0,
        };
        let target = sample(self.min_daily, self.max_daily, rng) as usize;

        DayPlan::new(date, existing, target, self.mode)
    }

    /// Count commits by configured author already present on UTC day `date`.
    ///
    /// A failed query is not fatal. It is logged, and the day is treated as
    /// having no existing commits.
    pub fn count_existing(&self, vcs: &impl VersionControl, date: NaiveDate) -> usize {
        let (since, until) = Stamp::day_bounds(date);
        match vcs.count_commits_between(&since, &until, &self.author) {
            Ok(count) => count,
            Err(error) => {
                warn!("cannot count existing commits on {date}, assuming none: {error}");
                0
            }
        }
    }
}
