// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Push reconciliation.
//!
//! Checkpoints push the current branch to a remote. A push can fail because
//! the network is flaky, or because another run already advanced the remote
//! branch. Either way the push is retried a bounded number of times with an
//! exponentially growing delay. Between attempts the remote branch is fetched
//! and merged into the local branch favoring local changes.
//!
//! # Favoring Local Changes
//!
//! The only content Greenfill ever tracks is its disposable marker artifact.
//! Resolving every conflict in favor of the local side therefore never loses
//! anything of value, and always leaves a branch that can be pushed.
//!
//! The retry schedule itself is a pure [`RetryPolicy`] driven by
//! [`retry_with_backoff`], which knows nothing about Git. Sleeping goes
//! through the [`Sleeper`] trait so schedules can be observed without waiting.

use crate::repo::{VcsError, VersionControl};

use std::{thread, time::Duration};
use tracing::{debug, info, instrument, warn};

/// Bounded retry schedule with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    initial: Duration,
}

impl RetryPolicy {
    /// Construct new retry policy.
    ///
    /// At least one attempt is always made.
    pub fn new(attempts: u32, initial: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial,
        }
    }

    /// Total number of attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delays slept between consecutive attempts.
    ///
    /// Yields `initial, initial * 2, initial * 4, ...`, one fewer than the
    /// number of attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let initial = self.initial;
        (0..self.attempts.saturating_sub(1)).map(move |step| {
            initial.saturating_mul(2u32.saturating_pow(step))
        })
    }
}

/// Wait out a backoff delay.
pub trait Sleeper {
    fn sleep(&mut self, delay: Duration);
}

/// Block the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// Every attempt of an operation failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run fallible `operation` under `policy`.
///
/// After every failed attempt except the last, the next delay is slept and
/// `between` runs before the operation is attempted again. Attempts are
/// numbered from one.
///
/// # Errors
///
/// - Return [`Exhausted`] holding the last failure if no attempt succeeded.
pub fn retry_with_backoff<T, E>(
    policy: &RetryPolicy,
    sleeper: &mut impl Sleeper,
    mut operation: impl FnMut(u32) -> Result<T, E>,
    mut between: impl FnMut(u32),
) -> Result<T, Exhausted<E>> {
    let mut delays = policy.delays();
    let mut attempt = 1;
    loop {
        let error = match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let Some(delay) = delays.next() else {
            return Err(Exhausted {
                attempts: attempt,
                last: error,
            });
        };

        sleeper.sleep(delay);
        between(attempt);
        attempt += 1;
    }
}

/// Remote synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    /// Remote to push to.
    pub remote: String,

    /// Remote branch to push to, defaulting to the current branch name.
    pub branch: Option<String>,

    /// Whether pushing actually touches the network.
    pub enabled: bool,
}

/// Push current branch with retries and favor-local reconciliation.
#[derive(Debug)]
pub struct PushReconciler<S = ThreadSleeper>
where
    S: Sleeper,
{
    target: PushTarget,
    policy: RetryPolicy,
    sleeper: S,
}

impl PushReconciler<ThreadSleeper> {
    /// Construct new push reconciler that blocks while backing off.
    pub fn new(target: PushTarget, policy: RetryPolicy) -> Self {
        Self::with_sleeper(target, policy, ThreadSleeper)
    }
}

impl<S> PushReconciler<S>
where
    S: Sleeper,
{
    /// Construct new push reconciler with custom sleeper.
    pub fn with_sleeper(target: PushTarget, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            target,
            policy,
            sleeper,
        }
    }

    /// Sleeper used between attempts.
    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Push current branch to configured remote.
    ///
    /// Disabled pushing only logs intent and succeeds.
    ///
    /// # Errors
    ///
    /// - Return [`PushError::Vcs`] if the current branch cannot be determined.
    /// - Return [`PushError::Exhausted`] if every push attempt failed.
    #[instrument(skip(self, vcs), level = "debug")]
    pub fn push(&mut self, vcs: &impl VersionControl) -> Result<()> {
        let remote = self.target.remote.as_str();
        if !self.target.enabled {
            info!("push disabled, skipping push to {remote}");
            return Ok(());
        }

        let local = vcs.current_branch()?;
        let remote_ref = self.target.branch.clone().unwrap_or_else(|| local.clone());
        info!("push {local} to {remote}/{remote_ref}");

        retry_with_backoff(
            &self.policy,
            &mut self.sleeper,
            |attempt| {
                debug!("push attempt {attempt}");
                vcs.push(remote, &local, &remote_ref)
                    .inspect_err(|err| warn!("push attempt {attempt} failed: {err}"))
            },
            |_| {
                if let Err(err) = vcs.fetch(remote, &remote_ref) {
                    warn!("cannot fetch {remote}/{remote_ref}, retrying push anyway: {err}");
                } else if let Err(err) = vcs.merge_favor_local(remote, &remote_ref) {
                    warn!("cannot merge {remote}/{remote_ref}, retrying push anyway: {err}");
                }
            },
        )
        .map_err(|exhausted| PushError::Exhausted {
            attempts: exhausted.attempts,
            source: exhausted.last,
        })
    }
}

/// Push error types.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Every push attempt failed.
    #[error("push failed after {attempts} attempt(s)")]
    Exhausted {
        attempts: u32,
        #[source]
        source: VcsError,
    },

    /// Version control operations fail.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = PushError> = std::result::Result<T, E>;
