// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Checkpoint and batch control.
//!
//! A __checkpoint__ flushes everything a backfill run has produced so far:
//! the marker artifact is cleared with its own commit, and the current branch
//! is pushed. When branch rotation is enabled, a successful push is followed
//! by switching to a fresh branch, so every batch lands on its own branch.
//!
//! # Checkpoint Policy
//!
//! Periodic checkpoints follow an explicit [`CheckpointPolicy`]. They either
//! fire every time the running commit total reaches a multiple of the batch
//! size, once at the end of every calendar day, or never. Regardless of
//! policy, a final checkpoint always runs once the calendar is exhausted.
//!
//! A failed push never aborts the run. The failure is logged, rotation is
//! skipped, and commits keep accumulating on the current branch until the
//! next checkpoint tries again.

use crate::{
    emit::{CommitEmitter, CommitError},
    push::{PushReconciler, Sleeper},
    repo::VersionControl,
    stamp::Stamp,
};

use std::num::NonZeroUsize;
use tracing::{info, instrument, warn};

/// When periodic checkpoints fire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// Only the final checkpoint runs.
    #[default]
    Disabled,

    /// Fire whenever the running total reaches a multiple of the batch size.
    EveryCommits(NonZeroUsize),

    /// Fire once at the end of every calendar day.
    Daily,
}

impl CheckpointPolicy {
    /// Select policy from batch settings.
    ///
    /// Daily checkpoints win over count based ones. A batch size of zero
    /// disables count based checkpoints.
    pub fn from_batch(size: usize, daily: bool) -> Self {
        if daily {
            return Self::Daily;
        }

        NonZeroUsize::new(size)
            .map(Self::EveryCommits)
            .unwrap_or(Self::Disabled)
    }
}

/// What triggered a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Count,
    EndOfDay,
    Final,
}

/// Counters of one backfill run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunCounters {
    /// Commits made so far.
    pub total_made: usize,

    /// Checkpoints taken so far.
    pub batch_index: usize,
}

/// Result of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Push succeeded, staying on the current branch.
    Pushed,

    /// Push succeeded, then switched to a new branch.
    Rotated(String),

    /// Push failed, staying on the current branch.
    PushFailed,
}

/// Tracks run counters and performs checkpoints at batch boundaries.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    policy: CheckpointPolicy,
    rotation_prefix: Option<String>,
    counters: RunCounters,
}

impl Checkpointer {
    /// Construct new checkpointer.
    ///
    /// Branches are rotated after successful pushes when `rotation_prefix` is
    /// set.
    pub fn new(policy: CheckpointPolicy, rotation_prefix: Option<String>) -> Self {
        Self {
            policy,
            rotation_prefix,
            counters: RunCounters::default(),
        }
    }

    /// Current run counters.
    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Record one emitted commit.
    ///
    /// Returns `true` when the running total hit a batch boundary.
    pub fn record_commit(&mut self) -> bool {
        self.counters.total_made += 1;
        match self.policy {
            CheckpointPolicy::EveryCommits(size) => self.counters.total_made % size.get() == 0,
            _ => false,
        }
    }

    /// Check if the end of a calendar day is a boundary.
    pub fn is_daily(&self) -> bool {
        self.policy == CheckpointPolicy::Daily
    }

    /// Flush pending work: clear marker, push, and maybe rotate.
    ///
    /// The cleanup commit is stamped at `stamp`. Rotated branch names use the
    /// wall clock time `now`. The final checkpoint never rotates.
    ///
    /// # Errors
    ///
    /// - Return [`CommitError`] if the marker cleanup commit fails. Push
    ///   and rotation failures are only logged.
    #[instrument(skip(self, vcs, emitter, reconciler), level = "debug")]
    pub fn checkpoint<S: Sleeper>(
        &mut self,
        vcs: &impl VersionControl,
        emitter: &CommitEmitter,
        reconciler: &mut PushReconciler<S>,
        stamp: &Stamp,
        now: &Stamp,
        boundary: Boundary,
    ) -> Result<CheckpointOutcome, CommitError> {
        self.counters.batch_index += 1;
        info!(
            "checkpoint {} after {} commit(s)",
            self.counters.batch_index, self.counters.total_made
        );

        emitter.clear(vcs, stamp)?;

        if let Err(err) = reconciler.push(vcs) {
            warn!("checkpoint {} not pushed: {err}", self.counters.batch_index);
            return Ok(CheckpointOutcome::PushFailed);
        }

        let prefix = match (&self.rotation_prefix, boundary) {
            (Some(prefix), Boundary::Count | Boundary::EndOfDay) if !emitter.is_dry_run() => {
                prefix
            }
            _ => return Ok(CheckpointOutcome::Pushed),
        };

        let name = rotation_branch_name(prefix, now, self.counters.batch_index);
        match vcs.create_branch_and_switch(&name) {
            Ok(()) => Ok(CheckpointOutcome::Rotated(name)),
            Err(err) => {
                warn!("cannot rotate to branch {name}: {err}");
                Ok(CheckpointOutcome::Pushed)
            }
        }
    }
}

/// Name of branch to rotate to after checkpoint `batch_index`.
pub fn rotation_branch_name(prefix: &str, now: &Stamp, batch_index: usize) -> String {
    format!(
        "{prefix}-{}-{batch_index}",
        now.as_datetime().format("%Y%m%d%H%M%S")
    )
}
