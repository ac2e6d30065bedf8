// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control access.
//!
//! Everything the backfill engine needs from Git goes through the
//! [`VersionControl`] trait: creating commits with explicit timestamps and
//! authorship, counting commits inside a time window, staging and removing
//! paths, branch rotation, and remote synchronization.
//!
//! [`Git2Repo`] implements the trait through libgit2 for most operations.
//! Merging is delegated to the Git binary, because libgit2 offers no
//! working-tree aware merge with a conflict favoring policy. Thus, the Git
//! binary must be installed for Greenfill to operate at all.

pub mod auth;
#[cfg(test)]
pub(crate) mod fake;

use crate::{
    identity::{Identity, IdentityError},
    repo::auth::IndicatifPrompter,
    stamp::Stamp,
};

use auth_git2::GitAuthenticator;
use git2::{
    BranchType, ErrorCode, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository, Sort,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
    time,
};
use tracing::{debug, info, instrument, warn};

/// Layer of indirection for version control access.
pub trait VersionControl {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    /// Short name of the branch HEAD points to.
    fn current_branch(&self) -> Result<String>;

    /// Count commits reachable from HEAD authored inside `[since, until)`.
    ///
    /// Only commits by `author` are counted, matched by email when known,
    /// otherwise by name. An unknown author matches every commit.
    fn count_commits_between(&self, since: &Stamp, until: &Stamp, author: &Identity)
        -> Result<usize>;

    /// Stage path relative to the working tree.
    fn stage_path(&self, path: &Path) -> Result<()>;

    /// Remove path relative to the working tree from the index.
    fn remove_path(&self, path: &Path) -> Result<()>;

    /// Commit current index onto HEAD.
    ///
    /// Author time and commit time are both set to `stamp`.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::NothingToCommit`] if the index matches HEAD.
    fn commit(&self, message: &str, author: &Identity, stamp: &Stamp) -> Result<Oid>;

    /// Create branch at HEAD and switch to it.
    fn create_branch_and_switch(&self, name: &str) -> Result<()>;

    /// Fetch branch `refname` from `remote` into its remote tracking ref.
    fn fetch(&self, remote: &str, refname: &str) -> Result<()>;

    /// Merge remote tracking ref of `refname` favoring local changes.
    fn merge_favor_local(&self, remote: &str, refname: &str) -> Result<()>;

    /// Push local branch to remote branch.
    fn push(&self, remote: &str, local_ref: &str, remote_ref: &str) -> Result<()>;
}

/// Version control access through libgit2.
pub struct Git2Repo {
    repository: Repository,
    workdir: PathBuf,
    quiet: bool,
}

impl Git2Repo {
    /// Open repository containing `path`.
    ///
    /// Searches `path` and its parents for a repository with a working tree.
    ///
    /// # Errors
    ///
    /// - Return [`EnvironmentError::NotARepository`] if no repository is
    ///   found.
    /// - Return [`EnvironmentError::Bare`] if the repository is bare.
    #[instrument(skip(path), level = "debug")]
    pub fn discover(path: impl AsRef<Path>) -> Result<Self, EnvironmentError> {
        debug!("discover repository from {:?}", path.as_ref().display());
        let repository =
            Repository::discover(path.as_ref()).map_err(|err| EnvironmentError::NotARepository {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?;

        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| EnvironmentError::Bare {
                path: repository.path().to_path_buf(),
            })?;

        Ok(Self {
            repository,
            workdir,
            quiet: false,
        })
    }

    /// Hide progress bars during remote transfers.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Git configuration of repository.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Git2`] if configuration cannot be opened.
    pub fn config(&self) -> Result<git2::Config> {
        Ok(self.repository.config()?)
    }

    fn is_empty(&self) -> bool {
        self.repository
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| self.repository.find_commit(oid).ok())
            .is_none()
    }

    // INVARIANT: Merges run through the git binary, so reload index if it changed on disk.
    fn index(&self) -> Result<git2::Index> {
        let mut index = self.repository.index()?;
        index.read(false)?;
        Ok(index)
    }

    fn progress_bar(&self, message: impl Into<String>) -> Result<ProgressBar> {
        if self.quiet {
            return Ok(ProgressBar::hidden());
        }

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(0).with_style(style);
        bar.set_message(message.into());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        Ok(bar)
    }

    fn gitcall(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<String> {
        let mut bin_args: Vec<&OsStr> = vec![OsStr::new("-C"), self.workdir.as_os_str()];
        let args = args.into_iter().collect::<Vec<_>>();
        bin_args.extend(args.iter().map(|arg| arg.as_ref()));

        syscall_non_interactive("git", bin_args)
    }
}

impl VersionControl for Git2Repo {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repository.head()?;
        if !head.is_branch() {
            return Err(VcsError::DetachedHead);
        }

        head.shorthand()
            .map(ToString::to_string)
            .ok_or(VcsError::DetachedHead)
    }

    #[instrument(skip(self, author), level = "debug")]
    fn count_commits_between(
        &self,
        since: &Stamp,
        until: &Stamp,
        author: &Identity,
    ) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }

        let mut revwalk = self.repository.revwalk()?;
        revwalk.set_sorting(Sort::NONE)?;
        revwalk.push_head()?;

        let mut count = 0;
        for oid in revwalk {
            let commit = self.repository.find_commit(oid?)?;
            let signature = commit.author();
            let when = signature.when().seconds();
            if when < since.unix() || when >= until.unix() {
                continue;
            }

            // INVARIANT: Prefer email over name when matching authorship.
            let matches = match (&author.email, &author.name) {
                (Some(email), _) => signature.email() == Some(email.as_str()),
                (None, Some(name)) => signature.name() == Some(name.as_str()),
                (None, None) => true,
            };

            if matches {
                count += 1;
            }
        }

        Ok(count)
    }

    fn stage_path(&self, path: &Path) -> Result<()> {
        let mut index = self.index()?;
        index.add_path(path)?;
        index.write()?;
        Ok(())
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        let mut index = self.index()?;
        index.remove_path(path)?;
        index.write()?;
        Ok(())
    }

    #[instrument(skip(self, author), level = "debug")]
    fn commit(&self, message: &str, author: &Identity, stamp: &Stamp) -> Result<Oid> {
        let mut index = self.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repository.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commit to append to.
        let parent = match self.repository.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                None
            }
            Err(err) => return Err(err.into()),
        };

        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_oid,
            None => tree.is_empty(),
        };
        if unchanged {
            return Err(VcsError::NothingToCommit);
        }

        let signature = author.signature(stamp)?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        debug!("created commit {oid} at {stamp}");

        Ok(oid)
    }

    #[instrument(skip(self), level = "debug")]
    fn create_branch_and_switch(&self, name: &str) -> Result<()> {
        let commit = self.repository.head()?.peel_to_commit()?;
        let branch = self.repository.branch(name, &commit, false)?;
        let refname = branch
            .get()
            .name()
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("refs/heads/{name}"));

        // INVARIANT: New branch points at HEAD, so the working tree is already in sync.
        self.repository.set_head(&refname)?;
        info!("switched to branch {name}");

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn fetch(&self, remote: &str, refname: &str) -> Result<()> {
        let mut remote_handle = self.repository.find_remote(remote)?;
        let bar = self.progress_bar(format!("fetch {remote}/{refname}"))?;
        let prompter = IndicatifPrompter::new(bar.clone());
        let authenticator = GitAuthenticator::default().set_prompter(prompter);
        let config = self.repository.config()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                bar.set_length(progress.total_objects() as u64);
                bar.set_position(progress.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let refspec = format!("+refs/heads/{refname}:refs/remotes/{remote}/{refname}");
        let result = remote_handle.fetch(&[refspec.as_str()], Some(&mut fo), None);
        bar.finish_and_clear();
        result?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn merge_favor_local(&self, remote: &str, refname: &str) -> Result<()> {
        let tracking = format!("{remote}/{refname}");
        if self
            .repository
            .find_branch(&tracking, BranchType::Remote)
            .is_err()
        {
            return Err(VcsError::MissingRemoteRef { refname: tracking });
        }

        match self.gitcall(["merge", "-X", "ours", "--no-edit", tracking.as_str()]) {
            Ok(output) => {
                debug!("{output}");
                Ok(())
            }
            Err(err) => {
                // INVARIANT: Never leave a half-merged index behind for the next commit.
                if let Err(abort) = self.gitcall(["merge", "--abort"]) {
                    warn!("cannot abort failed merge of {tracking}: {abort}");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn push(&self, remote: &str, local_ref: &str, remote_ref: &str) -> Result<()> {
        let mut remote_handle = self.repository.find_remote(remote)?;
        let bar = self.progress_bar(format!("push {local_ref} -> {remote}/{remote_ref}"))?;
        let prompter = IndicatifPrompter::new(bar.clone());
        let authenticator = GitAuthenticator::default().set_prompter(prompter);
        let config = self.repository.config()?;
        let refspec = format!("refs/heads/{local_ref}:refs/heads/{remote_ref}");

        let mut rejection = None;
        let result = {
            let mut rc = RemoteCallbacks::new();
            rc.credentials(authenticator.credentials(&config));
            rc.push_transfer_progress(|current, total, _bytes| {
                bar.set_length(total as u64);
                bar.set_position(current as u64);
            });
            rc.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejection = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });

            let mut po = PushOptions::new();
            po.remote_callbacks(rc);
            remote_handle.push(&[refspec.as_str()], Some(&mut po))
        };
        bar.finish_and_clear();
        result?;

        if let Some(message) = rejection {
            return Err(VcsError::PushRejected { message });
        }

        Ok(())
    }
}

/// Check that a command line tool can be executed.
///
/// # Errors
///
/// - Return [`EnvironmentError::MissingTool`] if `tool --version` fails.
pub fn require_tool(tool: &str) -> Result<(), EnvironmentError> {
    let version = syscall_non_interactive(tool, ["--version"]).map_err(|err| {
        EnvironmentError::MissingTool {
            tool: tool.to_string(),
            source: Box::new(err),
        }
    })?;
    debug!("found {version}");

    Ok(())
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(stdout.as_str());
    }

    if !stderr.is_empty() {
        message.push_str(stderr.as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end_matches(['\r', '\n']).to_string();

    if !output.status.success() {
        return Err(VcsError::Syscall(std::io::Error::other(format!(
            "command {:?} failed:\n{message}",
            cmd.as_ref()
        ))));
    }

    Ok(message)
}

/// Runtime environment cannot support a backfill run.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    /// Required command line tool is not installed.
    #[error("required tool {tool:?} is not available")]
    MissingTool {
        tool: String,
        #[source]
        source: Box<VcsError>,
    },

    /// No repository contains the target path.
    #[error("not inside a git repository: {:?}", path.display())]
    NotARepository {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Repository has no working tree.
    #[error("repository at {:?} is bare", path.display())]
    Bare { path: PathBuf },
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Index matches HEAD, so no commit can be made.
    #[error("nothing to commit")]
    NothingToCommit,

    /// HEAD does not point at a branch.
    #[error("HEAD is detached")]
    DetachedHead,

    /// Remote tracking ref has not been fetched.
    #[error("remote tracking ref {refname:?} does not exist")]
    MissingRemoteRef { refname: String },

    /// Remote refused to update a ref.
    #[error("push rejected: {message}")]
    PushRejected { message: String },

    /// Author identity cannot produce a signature.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary invocation fails.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
