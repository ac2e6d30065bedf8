// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Credential prompting for remote transfers.
//!
//! Pushing checkpoints or fetching the remote branch may require
//! credentials. When libgit2 cannot find any on its own, the user is prompted
//! interactively. Any progress bar drawn for the transfer is suspended while
//! the prompt is open so the two do not fight over the terminal.

use auth_git2::Prompter;
use indicatif::ProgressBar;
use inquire::{Password, Text};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

fn ask_password() -> Option<String> {
    Password::new("password")
        .without_confirmation()
        .prompt()
        .inspect_err(|err| warn!("password prompt aborted: {err}"))
        .ok()
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username")
                .prompt()
                .inspect_err(|err| warn!("username prompt aborted: {err}"))
                .ok()?;
            let password = ask_password()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(ask_password)
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(ask_password)
    }
}
