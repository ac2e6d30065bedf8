// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory version control double for unit tests.

use crate::{
    identity::Identity,
    repo::{Result, VcsError, VersionControl},
    stamp::Stamp,
};

use git2::Oid;
use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Recorded interaction with [`FakeVcs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Stage(PathBuf),
    Remove(PathBuf),
    Commit { message: String, stamp: String },
    Branch(String),
    Fetch(String),
    Merge(String),
    Push { local: String, remote: String },
}

#[derive(Debug)]
pub(crate) struct FakeVcs {
    workdir: PathBuf,
    branch: RefCell<String>,
    commits: RefCell<Vec<(Stamp, Identity)>>,
    tracked: RefCell<HashSet<PathBuf>>,
    dirty: Cell<bool>,
    calls: RefCell<Vec<Call>>,
    push_failures: Cell<usize>,
    fail_fetch: Cell<bool>,
    fail_count: Cell<bool>,
}

impl FakeVcs {
    /// Fake repository rooted at the current directory.
    pub(crate) fn new() -> Self {
        Self {
            workdir: std::env::current_dir().unwrap_or_default(),
            branch: RefCell::new("main".into()),
            commits: RefCell::default(),
            tracked: RefCell::default(),
            dirty: Cell::new(false),
            calls: RefCell::default(),
            push_failures: Cell::new(0),
            fail_fetch: Cell::new(false),
            fail_count: Cell::new(false),
        }
    }

    pub(crate) fn seed_commit(&self, stamp: &str, author: &Identity) {
        let stamp = stamp.parse().unwrap();
        self.commits.borrow_mut().push((stamp, author.clone()));
    }

    pub(crate) fn fail_pushes(&self, times: usize) {
        self.push_failures.set(times);
    }

    pub(crate) fn fail_fetches(&self) {
        self.fail_fetch.set(true);
    }

    pub(crate) fn fail_counts(&self) {
        self.fail_count.set(true);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn commit_messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Commit { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn pushes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Push { .. }))
            .count()
    }
}

impl VersionControl for FakeVcs {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.branch.borrow().clone())
    }

    fn count_commits_between(
        &self,
        since: &Stamp,
        until: &Stamp,
        author: &Identity,
    ) -> Result<usize> {
        if self.fail_count.get() {
            return Err(VcsError::DetachedHead);
        }

        Ok(self
            .commits
            .borrow()
            .iter()
            .filter(|(stamp, _)| stamp >= since && stamp < until)
            .filter(|(_, who)| match (&author.email, &author.name) {
                (Some(email), _) => who.email.as_ref() == Some(email),
                (None, Some(name)) => who.name.as_ref() == Some(name),
                (None, None) => true,
            })
            .count())
    }

    fn stage_path(&self, path: &Path) -> Result<()> {
        self.calls.borrow_mut().push(Call::Stage(path.to_path_buf()));
        self.tracked.borrow_mut().insert(path.to_path_buf());
        self.dirty.set(true);
        Ok(())
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        self.calls.borrow_mut().push(Call::Remove(path.to_path_buf()));
        if self.tracked.borrow_mut().remove(path) {
            self.dirty.set(true);
        }
        Ok(())
    }

    fn commit(&self, message: &str, author: &Identity, stamp: &Stamp) -> Result<Oid> {
        if !self.dirty.replace(false) {
            return Err(VcsError::NothingToCommit);
        }

        author.signature(stamp)?;
        self.commits.borrow_mut().push((*stamp, author.clone()));
        self.calls.borrow_mut().push(Call::Commit {
            message: message.into(),
            stamp: stamp.to_string(),
        });
        let id = self.commits.borrow().len();

        Ok(Oid::from_str(&format!("{id:040x}"))?)
    }

    fn create_branch_and_switch(&self, name: &str) -> Result<()> {
        self.calls.borrow_mut().push(Call::Branch(name.into()));
        *self.branch.borrow_mut() = name.into();
        Ok(())
    }

    fn fetch(&self, remote: &str, refname: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(Call::Fetch(format!("{remote}/{refname}")));
        if self.fail_fetch.get() {
            return Err(VcsError::MissingRemoteRef {
                refname: refname.into(),
            });
        }
        Ok(())
    }

    fn merge_favor_local(&self, remote: &str, refname: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(Call::Merge(format!("{remote}/{refname}")));
        Ok(())
    }

    fn push(&self, remote: &str, local_ref: &str, remote_ref: &str) -> Result<()> {
        self.calls.borrow_mut().push(Call::Push {
            local: local_ref.into(),
            remote: format!("{remote}/{remote_ref}"),
        });

        let failures = self.push_failures.get();
        if failures > 0 {
            self.push_failures.set(failures - 1);
            return Err(VcsError::PushRejected {
                message: format!("refs/heads/{remote_ref}: fetch first"),
            });
        }

        Ok(())
    }
}
