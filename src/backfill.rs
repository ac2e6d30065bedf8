// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backfill run driver.
//!
//! A run walks its date range one day at a time. Each day is planned, its
//! needed commits are synthesized in chronological order, and the
//! checkpointer is consulted after every commit and at the end of the day.
//! One day is fully processed before the next begins. Once the calendar is
//! exhausted, a final checkpoint flushes whatever is left.
//!
//! Commit failures abort the run, since a half-written history is worse than
//! a short one. Push failures never do.

use crate::{
    calendar::DateRange,
    checkpoint::{Boundary, CheckpointOutcome, CheckpointPolicy, Checkpointer},
    config::RunConfig,
    emit::{CommitEmitter, CommitError},
    push::{PushReconciler, PushTarget, RetryPolicy, Sleeper, ThreadSleeper},
    repo::VersionControl,
    schedule::Scheduler,
    stamp::{synthesize, Stamp},
};

use rand::Rng;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tracing::{info, instrument};

/// Summary of a finished backfill run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Days walked.
    pub days: usize,

    /// Days that already met their target.
    pub skipped_days: usize,

    /// Synthetic commits emitted, or planned in dry-run mode.
    pub commits: usize,

    /// Checkpoints taken, including the final one.
    pub checkpoints: usize,

    /// Checkpoints whose push failed.
    pub failed_pushes: usize,

    /// Branches rotated to, in order.
    pub rotations: Vec<String>,
}

impl Display for RunSummary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} commit(s) over {} day(s), {} day(s) skipped, {} checkpoint(s), {} failed push(es)",
            self.commits, self.days, self.skipped_days, self.checkpoints, self.failed_pushes
        )?;

        if let Some(branch) = self.rotations.last() {
            write!(fmt, ", now on {branch}")?;
        }

        Ok(())
    }
}

/// Backfill engine over a version control backend.
pub struct Backfill<V, R, S = ThreadSleeper>
where
    V: VersionControl,
    R: Rng,
    S: Sleeper,
{
    vcs: V,
    rng: R,
    message: String,
    scheduler: Scheduler,
    emitter: CommitEmitter,
    checkpointer: Checkpointer,
    reconciler: PushReconciler<S>,
    clock: fn() -> Stamp,
}

impl<V, R> Backfill<V, R, ThreadSleeper>
where
    V: VersionControl,
    R: Rng,
{
    /// Construct new backfill engine that blocks while backing off.
    ///
    /// The marker path of `config` must already be relative to the working
    /// tree of `vcs`.
    pub fn new(vcs: V, config: &RunConfig, rng: R) -> Self {
        Self::with_sleeper(vcs, config, rng, ThreadSleeper)
    }
}

impl<V, R, S> Backfill<V, R, S>
where
    V: VersionControl,
    R: Rng,
    S: Sleeper,
{
    /// Construct new backfill engine with custom backoff sleeper.
    pub fn with_sleeper(vcs: V, config: &RunConfig, rng: R, sleeper: S) -> Self {
        let batch = &config.batch;
        let target = PushTarget {
            remote: batch.remote.clone(),
            branch: batch.push_branch.clone(),
            enabled: batch.enable_push && !config.dry_run,
        };
        let policy = RetryPolicy::new(batch.retries, Duration::from_secs(batch.backoff_seconds));

        Self {
            vcs,
            rng,
            message: config.message.clone(),
            scheduler: Scheduler::new(
                config.min_daily,
                config.max_daily,
                config.mode,
                config.author.clone(),
            ),
            emitter: CommitEmitter::new(
                config.marker_path.clone(),
                config.author.clone(),
                config.dry_run,
            ),
            checkpointer: Checkpointer::new(
                CheckpointPolicy::from_batch(batch.size, batch.daily),
                batch.rotate.then(|| batch.branch_prefix.clone()),
            ),
            reconciler: PushReconciler::with_sleeper(target, policy, sleeper),
            clock: Stamp::now,
        }
    }

    /// Replace wall clock used to name rotated branches.
    pub fn with_clock(mut self, clock: fn() -> Stamp) -> Self {
        self.clock = clock;
        self
    }

    /// Version control backend.
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Backfill every day of `range`.
    ///
    /// # Errors
    ///
    /// - Return [`BackfillError::Commit`] if a synthetic commit or a marker
    ///   cleanup commit fails.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&mut self, range: DateRange) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        if range.is_empty() {
            info!("date range {range} is empty, nothing to backfill");
        } else {
            info!(
                "backfill {} day(s) in {range} ({:?} mode)",
                range.len(),
                self.scheduler.mode()
            );
        }

        let mut last_stamp = None;
        for date in range.walk() {
            summary.days += 1;
            let plan = self.scheduler.plan(&self.vcs, date, &mut self.rng);
            if plan.is_satisfied() {
                info!(
                    "skip {date}: {} existing commit(s) meet target of {}",
                    plan.existing, plan.target
                );
                summary.skipped_days += 1;
            } else {
                info!(
                    "{date}: {} commit(s) needed ({} existing, target {})",
                    plan.need, plan.existing, plan.target
                );
            }

            // INVARIANT: Commits of a day are emitted in chronological order.
            let mut stamps = (0..plan.need)
                .map(|_| synthesize(date, &mut self.rng))
                .collect::<Vec<_>>();
            stamps.sort();

            for stamp in stamps {
                self.emitter
                    .emit(&self.vcs, &mut self.rng, &stamp, &self.message)?;
                summary.commits += 1;
                last_stamp = Some(stamp);

                if self.checkpointer.record_commit() {
                    self.checkpoint(last_stamp, Boundary::Count, &mut summary)?;
                }
            }

            if self.checkpointer.is_daily() {
                self.checkpoint(last_stamp, Boundary::EndOfDay, &mut summary)?;
            }
        }

        self.checkpoint(last_stamp, Boundary::Final, &mut summary)?;
        info!("backfill done: {summary}");

        Ok(summary)
    }

    fn checkpoint(
        &mut self,
        last_stamp: Option<Stamp>,
        boundary: Boundary,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let now = (self.clock)();

        // INVARIANT: Cleanup commits never land outside the backfilled range.
        let stamp = last_stamp.unwrap_or(now);
        let outcome = self.checkpointer.checkpoint(
            &self.vcs,
            &self.emitter,
            &mut self.reconciler,
            &stamp,
            &now,
            boundary,
        )?;

        summary.checkpoints += 1;
        match outcome {
            CheckpointOutcome::Pushed => {}
            CheckpointOutcome::PushFailed => summary.failed_pushes += 1,
            CheckpointOutcome::Rotated(branch) => summary.rotations.push(branch),
        }

        Ok(())
    }
}

/// Backfill error types.
#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    /// Synthetic commit could not be created.
    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Friendly result alias :3
pub type Result<T, E = BackfillError> = std::result::Result<T, E>;
