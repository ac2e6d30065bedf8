// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{jane_config, RepoFixture, RepoKind};

use anyhow::Result;
use chrono::NaiveDate;
use greenfill::{
    backfill::Backfill,
    calendar::DateRange,
    config::DEFAULT_MESSAGE,
    emit::CLEAR_MESSAGE,
    identity::Identity,
    repo::{Git2Repo, VcsError, VersionControl},
    stamp::Stamp,
};
use pretty_assertions::assert_eq;
use git2::RepositoryState;
use rand::{rngs::StdRng, SeedableRng};
use sealed_test::prelude::*;
use std::path::Path;

fn date(text: &str) -> NaiveDate {
    text.parse().unwrap()
}

fn fixed_clock() -> Stamp {
    "2025-01-01T12:00:00Z".parse().unwrap()
}

fn jane() -> Identity {
    Identity::new(Some("Jane Doe".into()), Some("jane@doe.com".into()))
}

fn days_of(commits: &[(i64, i64, String)]) -> Vec<NaiveDate> {
    commits
        .iter()
        .map(|(author, _, _)| Stamp::from_unix(*author).unwrap().date())
        .collect()
}

#[sealed_test]
fn commit_keeps_author_and_committer_at_stamp() -> Result<()> {
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    let repo = Git2Repo::discover("repo")?;

    std::fs::write(repo.workdir().join("marker.txt"), "one\n")?;
    repo.stage_path(Path::new("marker.txt"))?;
    let stamp: Stamp = "2023-06-15T10:30:00Z".parse()?;
    let oid = repo.commit("chore: test", &jane(), &stamp)?;

    let commit = fixture.repo().find_commit(oid)?;
    assert_eq!(commit.author().when().seconds(), stamp.unix());
    assert_eq!(commit.committer().when().seconds(), stamp.unix());
    assert_eq!(commit.author().email(), Some("jane@doe.com"));
    assert_eq!(commit.committer().name(), Some("Jane Doe"));
    assert_eq!(commit.parent_count(), 1);

    // INVARIANT: Unchanged index refuses to commit.
    let result = repo.commit("chore: test", &jane(), &stamp);
    assert!(matches!(result, Err(VcsError::NothingToCommit)));

    Ok(())
}

#[sealed_test]
fn count_commits_between_filters_by_author_and_day() -> Result<()> {
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    let repo = Git2Repo::discover("repo")?;

    for (line, stamp) in [
        ("a", "2023-06-14T23:59:59Z"),
        ("b", "2023-06-15T00:00:00Z"),
        ("c", "2023-06-15T18:00:00Z"),
        ("d", "2023-06-16T00:00:00Z"),
    ] {
        std::fs::write(repo.workdir().join("marker.txt"), line)?;
        repo.stage_path(Path::new("marker.txt"))?;
        repo.commit("chore: test", &jane(), &stamp.parse()?)?;
    }

    let (since, until) = Stamp::day_bounds(date("2023-06-15"));
    assert_eq!(repo.count_commits_between(&since, &until, &jane())?, 2);

    // INVARIANT: Email wins over name when matching authors.
    let renamed = Identity::new(Some("Someone Else".into()), Some("jane@doe.com".into()));
    assert_eq!(repo.count_commits_between(&since, &until, &renamed)?, 2);
    let john = Identity::new(Some("John Doe".into()), Some("john@doe.com".into()));
    assert_eq!(repo.count_commits_between(&since, &until, &john)?, 0);
    let by_name = Identity::new(Some("Jane Doe".into()), None);
    assert_eq!(repo.count_commits_between(&since, &until, &by_name)?, 2);

    Ok(())
}

#[sealed_test]
fn count_commits_in_empty_repository_is_zero() -> Result<()> {
    RepoFixture::new("repo", RepoKind::Normal)?;
    let repo = Git2Repo::discover("repo")?;

    let (since, until) = Stamp::day_bounds(date("2023-06-15"));
    assert_eq!(repo.count_commits_between(&since, &until, &jane())?, 0);

    Ok(())
}

#[sealed_test]
fn branch_switch_moves_head() -> Result<()> {
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    let repo = Git2Repo::discover("repo")?;

    assert_eq!(repo.current_branch()?, "main");
    repo.create_branch_and_switch("backfill-20250101120000-1")?;
    assert_eq!(repo.current_branch()?, "backfill-20250101120000-1");

    let head = fixture.repo().head()?.target();
    let main = fixture.repo().find_reference("refs/heads/main")?.target();
    assert_eq!(head, main);

    Ok(())
}

#[sealed_test]
fn discover_rejects_bare_repository() -> Result<()> {
    RepoFixture::new("bare.git", RepoKind::Bare)?;
    let result = Git2Repo::discover("bare.git");
    assert!(result.is_err());

    Ok(())
}

#[sealed_test]
fn backfill_writes_dated_commits_by_author() -> Result<()> {
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    let repo = Git2Repo::discover("repo")?;
    let config = jane_config(2)?;

    let summary = Backfill::new(repo, &config, StdRng::seed_from_u64(7))
        .run(DateRange::new(date("2023-06-15"), date("2023-06-17")))?;
    assert_eq!(summary.days, 3);
    assert_eq!(summary.commits, 6);
    assert_eq!(summary.checkpoints, 1);

    let commits = fixture.commits_with_message("refs/heads/main", DEFAULT_MESSAGE)?;
    assert_eq!(commits.len(), 6);
    for (author, committer, email) in &commits {
        assert_eq!(author, committer);
        assert_eq!(email, "jane@doe.com");
    }
    assert_eq!(
        days_of(&commits),
        vec![
            date("2023-06-15"),
            date("2023-06-15"),
            date("2023-06-16"),
            date("2023-06-16"),
            date("2023-06-17"),
            date("2023-06-17"),
        ]
    );

    // INVARIANT: Final checkpoint leaves no marker behind.
    assert!(!fixture.workdir().join("marker.txt").exists());
    let clears = fixture.commits_with_message("refs/heads/main", CLEAR_MESSAGE)?;
    assert_eq!(clears.len(), 1);
    assert_eq!(days_of(&clears), vec![date("2023-06-17")]);

    Ok(())
}

#[sealed_test]
fn rerun_only_tops_up_missing_commits() -> Result<()> {
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    let range = DateRange::new(date("2023-06-15"), date("2023-06-16"));

    let config = jane_config(2)?;
    Backfill::new(Git2Repo::discover("repo")?, &config, StdRng::seed_from_u64(1)).run(range)?;

    // The cleanup commit on 2023-06-16 already counts toward its target.
    let config = jane_config(3)?;
    let summary = Backfill::new(Git2Repo::discover("repo")?, &config, StdRng::seed_from_u64(2))
        .run(range)?;
    assert_eq!(summary.commits, 1);
    assert_eq!(summary.skipped_days, 1);

    let commits = fixture.commits_with_message("refs/heads/main", DEFAULT_MESSAGE)?;
    let days = days_of(&commits);
    assert_eq!(days.iter().filter(|day| **day == date("2023-06-15")).count(), 3);
    assert_eq!(days.iter().filter(|day| **day == date("2023-06-16")).count(), 2);

    Ok(())
}

#[sealed_test]
fn checkpoints_push_and_rotate_branches() -> Result<()> {
    let remote = RepoFixture::new("remote.git", RepoKind::Bare)?;
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    fixture.add_remote("origin", std::env::current_dir()?.join("remote.git"))?;

    let mut config = jane_config(1)?;
    config.quiet = true;
    config.batch.size = 2;
    config.batch.enable_push = true;
    config.batch.rotate = true;
    let repo = Git2Repo::discover("repo")?.quiet(true);

    let mut backfill =
        Backfill::new(repo, &config, StdRng::seed_from_u64(3)).with_clock(fixed_clock);
    let summary = backfill.run(DateRange::new(date("2023-06-15"), date("2023-06-17")))?;
    assert_eq!(summary.checkpoints, 2);
    assert_eq!(summary.failed_pushes, 0);
    assert_eq!(summary.rotations, vec!["backfill-20250101120000-1"]);
    assert_eq!(backfill.vcs().current_branch()?, "backfill-20250101120000-1");

    // First batch landed on main, the rest on the rotated branch.
    let pushed_main = remote.commits_with_message("refs/heads/main", DEFAULT_MESSAGE)?;
    assert_eq!(pushed_main.len(), 2);
    let pushed_rotated =
        remote.commits_with_message("refs/heads/backfill-20250101120000-1", DEFAULT_MESSAGE)?;
    assert_eq!(pushed_rotated.len(), 3);

    let local_head = fixture.repo().head()?.target();
    let remote_head = remote
        .repo()
        .find_reference("refs/heads/backfill-20250101120000-1")?
        .target();
    assert_eq!(local_head, remote_head);

    Ok(())
}

#[sealed_test]
fn rejected_push_merges_remote_changes() -> Result<()> {
    let remote = RepoFixture::new("remote.git", RepoKind::Bare)?;
    let remote_path = std::env::current_dir()?.join("remote.git");
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    fixture.add_remote("origin", &remote_path)?;

    let repo = Git2Repo::discover("repo")?.quiet(true);
    repo.push("origin", "main", "main")?;

    // Someone else moves the remote branch ahead.
    let other = RepoFixture::clone_remote(remote_path.to_string_lossy(), "other")?;
    other.stage_and_commit("other.txt", "theirs")?;
    other
        .repo()
        .find_remote("origin")?
        .push(&["refs/heads/main:refs/heads/main"], None)?;

    let mut config = jane_config(1)?;
    config.quiet = true;
    config.batch.enable_push = true;
    let summary = Backfill::new(repo, &config, StdRng::seed_from_u64(4))
        .run(DateRange::new(date("2023-06-15"), date("2023-06-16")))?;
    assert_eq!(summary.failed_pushes, 0);

    let tip = remote
        .repo()
        .find_reference("refs/heads/main")?
        .peel_to_commit()?;
    assert!(tip.tree()?.get_name("other.txt").is_some());
    assert_eq!(
        remote
            .commits_with_message("refs/heads/main", DEFAULT_MESSAGE)?
            .len(),
        2
    );

    Ok(())
}

#[sealed_test]
fn failed_merge_is_aborted_and_run_keeps_committing() -> Result<()> {
    RepoFixture::new("remote.git", RepoKind::Bare)?;
    let remote_path = std::env::current_dir()?.join("remote.git");
    let fixture = RepoFixture::new("repo", RepoKind::Normal)?;
    fixture.stage_and_commit("README.md", "hello")?;
    fixture.add_remote("origin", &remote_path)?;

    let repo = Git2Repo::discover("repo")?.quiet(true);
    repo.push("origin", "main", "main")?;

    // Remote edits a file that was deleted locally, so favoring local
    // changes still ends in a modify/delete conflict.
    let other = RepoFixture::clone_remote(remote_path.to_string_lossy(), "other")?;
    other.stage_and_commit("README.md", "theirs")?;
    other
        .repo()
        .find_remote("origin")?
        .push(&["refs/heads/main:refs/heads/main"], None)?;
    fixture.remove_and_commit("README.md")?;

    let mut config = jane_config(1)?;
    config.quiet = true;
    config.batch.size = 1;
    config.batch.enable_push = true;
    config.batch.retries = 2;
    let summary = Backfill::new(repo, &config, StdRng::seed_from_u64(5))
        .run(DateRange::new(date("2023-06-15"), date("2023-06-16")))?;
    assert_eq!(summary.commits, 2);
    assert_eq!(summary.checkpoints, 3);
    assert_eq!(summary.failed_pushes, 3);

    assert!(matches!(fixture.repo().state(), RepositoryState::Clean));
    assert_eq!(
        fixture
            .commits_with_message("refs/heads/main", DEFAULT_MESSAGE)?
            .len(),
        2
    );

    Ok(())
}
