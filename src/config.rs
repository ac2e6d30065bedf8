// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Greenfill layers its configuration. Built-in defaults come first, then an
//! optional settings file, then command line flags. Each layer is a
//! [`Settings`] value where every field is optional, so layers merge by
//! simply letting the later layer's present fields win.
//!
//! Once merged, settings are validated and frozen into a [`RunConfig`] that
//! stays read-only for the whole run.
//!
//! # Settings File Layout
//!
//! ```toml
//! [run]
//! dry_run = false
//! message = "chore: backfill activity"
//!
//! [schedule]
//! min_daily = 1
//! max_daily = 4
//! mode = "existing-aware"
//!
//! [author]
//! name = "John Doe"
//! email = "john@doe.com"
//!
//! [marker]
//! path = ".greenfill/activity.log"
//!
//! [batch]
//! size = 10
//! remote = "origin"
//! enable_push = true
//! ```

use crate::{
    identity::{Identity, IdentityProvider},
    schedule::ScheduleMode,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Default lower bound of daily commits.
pub const DEFAULT_MIN_DAILY: u32 = 1;

/// Default upper bound of daily commits.
pub const DEFAULT_MAX_DAILY: u32 = 4;

/// Default marker artifact path relative to the working tree.
pub const DEFAULT_MARKER_PATH: &str = ".greenfill/activity.log";

/// Default commit message of synthetic commits.
pub const DEFAULT_MESSAGE: &str = "chore: backfill activity";

/// Default remote to push checkpoints to.
pub const DEFAULT_REMOTE: &str = "origin";

/// Default prefix of rotated branches.
pub const DEFAULT_BRANCH_PREFIX: &str = "backfill";

/// Default number of push attempts per checkpoint.
pub const DEFAULT_PUSH_RETRIES: u32 = 3;

/// Default initial push backoff in seconds.
pub const DEFAULT_PUSH_BACKOFF: u64 = 2;

/// One configuration layer.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub run: RunSettings,
    pub schedule: ScheduleSettings,
    pub author: AuthorSettings,
    pub marker: MarkerSettings,
    pub batch: BatchSettings,
}

impl Settings {
    /// Load settings file at `path`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_to_string(path.as_ref())
            .map_err(|err| ConfigError::ReadFile {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?
            .parse()
    }

    /// Layer `other` on top of this layer.
    pub fn merge(self, other: Settings) -> Self {
        Self {
            run: RunSettings {
                dry_run: other.run.dry_run.or(self.run.dry_run),
                quiet: other.run.quiet.or(self.run.quiet),
                message: other.run.message.or(self.run.message),
            },
            schedule: ScheduleSettings {
                min_daily: other.schedule.min_daily.or(self.schedule.min_daily),
                max_daily: other.schedule.max_daily.or(self.schedule.max_daily),
                mode: other.schedule.mode.or(self.schedule.mode),
            },
            author: AuthorSettings {
                name: other.author.name.or(self.author.name),
                email: other.author.email.or(self.author.email),
            },
            marker: MarkerSettings {
                path: other.marker.path.or(self.marker.path),
            },
            batch: BatchSettings {
                size: other.batch.size.or(self.batch.size),
                daily: other.batch.daily.or(self.batch.daily),
                remote: other.batch.remote.or(self.batch.remote),
                push_branch: other.batch.push_branch.or(self.batch.push_branch),
                rotate: other.batch.rotate.or(self.batch.rotate),
                branch_prefix: other.batch.branch_prefix.or(self.batch.branch_prefix),
                enable_push: other.batch.enable_push.or(self.batch.enable_push),
                retries: other.batch.retries.or(self.batch.retries),
                backoff_seconds: other.batch.backoff_seconds.or(self.batch.backoff_seconds),
            },
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on marker path field.
        if let Some(path) = settings.marker.path.take() {
            settings.marker.path = Some(PathBuf::from(
                shellexpand::full(path.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// General run behavior.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet: Option<bool>,

    /// Message of synthetic commits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Daily commit volume.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_daily: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_daily: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ScheduleMode>,
}

/// Author identity override.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Marker artifact location.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Checkpoint batching and remote synchronization.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_branch: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_push: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_seconds: Option<u64>,
}

/// Validated configuration of one backfill run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub min_daily: u32,
    pub max_daily: u32,
    pub mode: ScheduleMode,
    pub author: Identity,
    pub marker_path: PathBuf,
    pub message: String,
    pub dry_run: bool,
    pub quiet: bool,
    pub batch: BatchConfig,
}

/// Validated checkpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Commits per checkpoint, zero disables count based checkpoints.
    pub size: usize,
    pub daily: bool,
    pub remote: String,
    pub push_branch: Option<String>,
    pub rotate: bool,
    pub branch_prefix: String,
    pub enable_push: bool,
    pub retries: u32,
    pub backoff_seconds: u64,
}

impl RunConfig {
    /// Fill missing author parts from `provider`.
    ///
    /// Explicitly configured parts always win.
    pub fn resolve_author(&mut self, provider: &dyn IdentityProvider) {
        self.author = std::mem::take(&mut self.author).or(provider.resolve());
    }

    /// Marker path relative to working tree `workdir`.
    ///
    /// Relative marker paths are taken relative to the working tree. Both
    /// forms are normalized lexically, so `.` and `..` components are fine
    /// as long as the result stays inside the working tree.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MarkerOutsideWorkTree`] if marker would not be
    ///   tracked by the repository.
    pub fn marker_relative_to(&self, workdir: impl AsRef<Path>) -> Result<PathBuf> {
        let outside = || ConfigError::MarkerOutsideWorkTree {
            path: self.marker_path.clone(),
        };

        let workdir = normalize(workdir.as_ref()).ok_or_else(outside)?;
        let marker = normalize(&workdir.join(&self.marker_path)).ok_or_else(outside)?;
        let relative = marker.strip_prefix(&workdir).map_err(|_| outside())?;

        // INVARIANT: libgit2 only accepts plain repository relative paths.
        if relative.file_name().is_none()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(outside());
        }

        Ok(relative.to_path_buf())
    }
}

/// Resolve `.` and `..` components of `path` without touching the filesystem.
///
/// Returns `None` if `..` would climb above the start of `path`.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normal.components().next_back() {
                Some(Component::Normal(_)) => {
                    normal.pop();
                }
                _ => return None,
            },
            other => normal.push(other),
        }
    }

    Some(normal)
}

impl TryFrom<Settings> for RunConfig {
    type Error = ConfigError;

    fn try_from(settings: Settings) -> Result<Self, Self::Error> {
        let min_daily = settings.schedule.min_daily.unwrap_or(DEFAULT_MIN_DAILY);
        let max_daily = settings.schedule.max_daily.unwrap_or(DEFAULT_MAX_DAILY);
        if min_daily == 0 {
            return Err(ConfigError::ZeroDaily);
        }
        if min_daily > max_daily {
            return Err(ConfigError::InvertedBounds {
                min: min_daily,
                max: max_daily,
            });
        }

        let retries = settings.batch.retries.unwrap_or(DEFAULT_PUSH_RETRIES);
        if retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        let backoff_seconds = settings.batch.backoff_seconds.unwrap_or(DEFAULT_PUSH_BACKOFF);
        if backoff_seconds == 0 {
            return Err(ConfigError::ZeroBackoff);
        }
        let branch_prefix = settings
            .batch
            .branch_prefix
            .unwrap_or_else(|| DEFAULT_BRANCH_PREFIX.into());
        if branch_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyBranchPrefix);
        }

        Ok(Self {
            min_daily,
            max_daily,
            mode: settings.schedule.mode.unwrap_or_default(),
            author: Identity::new(settings.author.name, settings.author.email),
            marker_path: settings
                .marker
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MARKER_PATH)),
            message: settings
                .run
                .message
                .unwrap_or_else(|| DEFAULT_MESSAGE.into()),
            dry_run: settings.run.dry_run.unwrap_or(false),
            quiet: settings.run.quiet.unwrap_or(false),
            batch: BatchConfig {
                size: settings.batch.size.unwrap_or(0),
                daily: settings.batch.daily.unwrap_or(false),
                remote: settings
                    .batch
                    .remote
                    .unwrap_or_else(|| DEFAULT_REMOTE.into()),
                push_branch: settings.batch.push_branch,
                rotate: settings.batch.rotate.unwrap_or(false),
                branch_prefix,
                enable_push: settings.batch.enable_push.unwrap_or(false),
                retries,
                backoff_seconds,
            },
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Lower daily bound exceeds upper daily bound.
    #[error("minimum daily commits ({min}) exceeds maximum daily commits ({max})")]
    InvertedBounds { min: u32, max: u32 },

    /// Daily commit bounds must be positive.
    #[error("daily commit bounds must be positive")]
    ZeroDaily,

    /// At least one push attempt is required.
    #[error("push retries must be positive")]
    ZeroRetries,

    /// Push backoff must be positive.
    #[error("push backoff must be positive")]
    ZeroBackoff,

    /// Rotated branches need a name prefix.
    #[error("branch prefix must not be empty")]
    EmptyBranchPrefix,

    /// Marker artifact would not be tracked by the repository.
    #[error("marker artifact {:?} is not inside the working tree", path.display())]
    MarkerOutsideWorkTree { path: PathBuf },

    /// Settings file cannot be read.
    #[error("failed to read settings file at {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
