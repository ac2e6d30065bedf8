// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use greenfill::{
    backfill::Backfill,
    calendar::DateRange,
    config::{
        AuthorSettings, BatchSettings, MarkerSettings, RunConfig, RunSettings, ScheduleSettings,
        Settings,
    },
    identity::GitConfigIdentity,
    path::default_settings_path,
    repo::{require_tool, Git2Repo, VersionControl},
    schedule::ScheduleMode,
};

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use std::{path::PathBuf, process::exit};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Backfill a Git repository with synthetic commit history.
#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "greenfill [options] --start <date> [--end <date>]",
    version
)]
struct Cli {
    /// First day to backfill (YYYY-MM-DD).
    #[arg(long, value_name = "date")]
    pub start: NaiveDate,

    /// Last day to backfill (YYYY-MM-DD), defaults to today in UTC.
    #[arg(long, value_name = "date")]
    pub end: Option<NaiveDate>,

    /// Minimum commits per day.
    #[arg(long = "min", value_name = "count")]
    pub min_daily: Option<u32>,

    /// Maximum commits per day.
    #[arg(long = "max", value_name = "count")]
    pub max_daily: Option<u32>,

    /// Whether existing commits count toward the daily target.
    #[arg(long, value_enum, value_name = "mode")]
    pub mode: Option<ScheduleMode>,

    /// Author name, defaults to git's user.name.
    #[arg(long, value_name = "name")]
    pub author_name: Option<String>,

    /// Author email, defaults to git's user.email.
    #[arg(long, value_name = "email")]
    pub author_email: Option<String>,

    /// Marker artifact path inside the work tree.
    #[arg(long = "file", value_name = "path")]
    pub marker: Option<PathBuf>,

    /// Message of synthetic commits.
    #[arg(long, value_name = "text")]
    pub message: Option<String>,

    /// Log intended commits and pushes without performing them.
    #[arg(long)]
    pub dry_run: bool,

    /// Only report errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Commits per checkpoint, 0 disables periodic checkpoints.
    #[arg(long, value_name = "count")]
    pub batch_size: Option<usize>,

    /// Checkpoint once at the end of every day instead of by count.
    #[arg(long, conflicts_with = "batch_size")]
    pub checkpoint_daily: bool,

    /// Remote to push checkpoints to.
    #[arg(long, value_name = "name")]
    pub remote: Option<String>,

    /// Remote branch to push to, defaults to the current branch.
    #[arg(long, value_name = "branch")]
    pub push_branch: Option<String>,

    /// Switch to a fresh branch after every successful checkpoint push.
    #[arg(long)]
    pub rotate: bool,

    /// Name prefix of rotated branches.
    #[arg(long, value_name = "prefix")]
    pub branch_prefix: Option<String>,

    /// Actually push checkpoints to the remote.
    #[arg(long)]
    pub enable_push: bool,

    /// Push attempts per checkpoint.
    #[arg(long, value_name = "count")]
    pub push_retries: Option<u32>,

    /// Initial delay between push attempts, doubled after every failure.
    #[arg(long, value_name = "seconds")]
    pub push_backoff: Option<u64>,

    /// Seed for reproducible schedules.
    #[arg(long, value_name = "seed")]
    pub seed: Option<u64>,

    /// Settings file, defaults to $XDG_CONFIG_HOME/greenfill/config.toml.
    #[arg(long, value_name = "path")]
    pub config: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Settings {
        let flag = |set: bool| set.then_some(true);

        Settings {
            run: RunSettings {
                dry_run: flag(self.dry_run),
                quiet: flag(self.quiet),
                message: self.message.clone(),
            },
            schedule: ScheduleSettings {
                min_daily: self.min_daily,
                max_daily: self.max_daily,
                mode: self.mode,
            },
            author: AuthorSettings {
                name: self.author_name.clone(),
                email: self.author_email.clone(),
            },
            marker: MarkerSettings {
                path: self.marker.clone(),
            },
            batch: BatchSettings {
                size: self.batch_size,
                daily: flag(self.checkpoint_daily),
                remote: self.remote.clone(),
                push_branch: self.push_branch.clone(),
                rotate: flag(self.rotate),
                branch_prefix: self.branch_prefix.clone(),
                enable_push: flag(self.enable_push),
                retries: self.push_retries,
                backoff_seconds: self.push_backoff,
            },
        }
    }

    /// Layer CLI flags over the settings file.
    ///
    /// Relative marker paths given on the command line are taken relative to
    /// the current directory.
    fn layered_settings(&self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => Settings::load(path)?,
            None => match default_settings_path() {
                Ok(path) if path.is_file() => Settings::load(path)?,
                _ => Settings::default(),
            },
        };

        let mut flags = self.settings();
        if let Some(marker) = flags.marker.path.take() {
            flags.marker.path = Some(std::env::current_dir()?.join(marker));
        }

        Ok(file.merge(flags))
    }

    fn run(self, settings: Settings) -> Result<()> {
        require_tool("git")?;
        let repo = Git2Repo::discover(std::env::current_dir()?)?;

        let mut config = RunConfig::try_from(settings)?;
        let repo = repo.quiet(config.quiet);

        config.resolve_author(&GitConfigIdentity::new(repo.config()?));
        config.marker_path = config.marker_relative_to(repo.workdir())?;
        debug!("marker artifact at {:?}", config.marker_path.display());

        let end = self.end.unwrap_or_else(|| Utc::now().date_naive());
        let range = DateRange::new(self.start, end);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let summary = Backfill::new(repo, &config, rng).run(range)?;
        info!("{summary}");

        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    // INVARIANT: Quiet from any settings layer applies before anything is logged.
    let settings = cli.layered_settings();
    let quiet = match &settings {
        Ok(settings) => settings.run.quiet.unwrap_or(false),
        Err(_) => cli.quiet,
    };

    let level = if quiet { "error" } else { "info" };
    let layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = settings.and_then(|settings| cli.run(settings)) {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}
