// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backfill a Git repository with synthetic commit history.
//!
//! Greenfill walks a range of calendar days and creates a configurable
//! number of commits on each of them, stamped at random times inside the
//! day. Commits can be grouped into batches that are pushed to a remote at
//! every checkpoint, optionally rotating to a fresh branch after each push.
//!
//! # Components
//!
//! 1. [`calendar`] walks the date range.
//! 2. [`schedule`] decides how many commits each day needs.
//! 3. [`stamp`] picks a time for each commit.
//! 4. [`emit`] materializes commits through a marker artifact.
//! 5. [`checkpoint`] decides when to flush and push.
//! 6. [`push`] pushes with retries and conflict reconciliation.
//!
//! [`backfill::Backfill`] drives all of them over a [`repo::VersionControl`]
//! backend.

pub mod backfill;
pub mod calendar;
pub mod checkpoint;
pub mod config;
pub mod emit;
pub mod identity;
pub mod path;
pub mod push;
pub mod repo;
pub mod schedule;
pub mod stamp;
