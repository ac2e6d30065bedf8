// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Synthetic commit emission.
//!
//! A commit needs a real content change to exist. Greenfill gets one by
//! appending a line to a tracked __marker artifact__ for every synthetic
//! commit. Each line holds the commit's timestamp plus a random token, so two
//! commits stamped the same second still differ in content.
//!
//! The marker is disposable. It is lazily created when the first commit of a
//! batch needs it, and removed again with its own commit at every checkpoint.

use crate::{
    identity::Identity,
    repo::{VcsError, VersionControl},
    stamp::Stamp,
};

use git2::Oid;
use rand::Rng;
use std::{
    fs::{remove_file, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Commit message used when the marker artifact is cleared.
pub const CLEAR_MESSAGE: &str = "chore: clear backfill marker";

/// Emit synthetic commits through a marker artifact.
#[derive(Debug, Clone)]
pub struct CommitEmitter {
    marker: PathBuf,
    author: Identity,
    dry_run: bool,
}

impl CommitEmitter {
    /// Construct new commit emitter.
    ///
    /// The `marker` path is relative to the working tree.
    pub fn new(marker: impl Into<PathBuf>, author: Identity, dry_run: bool) -> Self {
        Self {
            marker: marker.into(),
            author,
            dry_run,
        }
    }

    /// Check if emission only logs intent.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Emit one synthetic commit stamped at `stamp`.
    ///
    /// Returns the new commit's id, or [`None`] in dry-run mode.
    ///
    /// # Errors
    ///
    /// - Return [`CommitError::Marker`] if marker artifact cannot be written.
    /// - Return [`CommitError::NothingToCommit`] if staging changed nothing.
    /// - Return [`CommitError::Vcs`] if staging or committing fails.
    #[instrument(skip(self, vcs, rng), level = "debug")]
    pub fn emit(
        &self,
        vcs: &impl VersionControl,
        rng: &mut impl Rng,
        stamp: &Stamp,
        message: &str,
    ) -> Result<Option<Oid>> {
        if self.dry_run {
            info!("dry-run: would commit {message:?} at {stamp}");
            return Ok(None);
        }

        let token: u32 = rng.gen();
        self.append_marker(vcs.workdir(), &format!("{stamp} {token:08x}"))?;
        vcs.stage_path(&self.marker)?;
        let oid = vcs
            .commit(message, &self.author, stamp)
            .map_err(CommitError::from_vcs)?;
        debug!("committed {oid} at {stamp}");

        Ok(Some(oid))
    }

    /// Remove marker artifact with its own commit stamped at `stamp`.
    ///
    /// Returns `false` when there was nothing to remove.
    ///
    /// # Errors
    ///
    /// - Return [`CommitError::Marker`] if marker artifact cannot be deleted.
    /// - Return [`CommitError::Vcs`] if removal or committing fails.
    #[instrument(skip(self, vcs), level = "debug")]
    pub fn clear(&self, vcs: &impl VersionControl, stamp: &Stamp) -> Result<bool> {
        if self.dry_run {
            info!("dry-run: would clear marker {:?}", self.marker.display());
            return Ok(false);
        }

        let path = vcs.workdir().join(&self.marker);
        if path.is_file() {
            remove_file(&path).map_err(|err| CommitError::Marker {
                source: err,
                path: path.clone(),
            })?;
        }
        vcs.remove_path(&self.marker)?;

        match vcs.commit(CLEAR_MESSAGE, &self.author, stamp) {
            Ok(oid) => {
                debug!("cleared marker in {oid}");
                Ok(true)
            }
            Err(VcsError::NothingToCommit) => {
                debug!("marker {:?} already clear", self.marker.display());
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn append_marker(&self, workdir: &Path, line: &str) -> Result<()> {
        let path = workdir.join(&self.marker);
        let wrap = |err: std::io::Error| CommitError::Marker {
            source: err,
            path: path.clone(),
        };

        // INVARIANT: Lazily create marker and its parent directories.
        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(wrap)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(wrap)?;
        writeln!(file, "{line}").map_err(wrap)?;

        Ok(())
    }
}

/// Commit emission error types.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// Index matched HEAD after staging.
    #[error("nothing to commit")]
    NothingToCommit,

    /// Marker artifact cannot be written or removed.
    #[error("failed to update marker artifact at {:?}", path.display())]
    Marker {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Version control operations fail.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

impl CommitError {
    fn from_vcs(err: VcsError) -> Self {
        match err {
            VcsError::NothingToCommit => Self::NothingToCommit,
            err => Self::Vcs(err),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = CommitError> = std::result::Result<T, E>;
