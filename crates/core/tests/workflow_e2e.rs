//! End-to-end tests for the topic/iteration workflows.
//!
//! These tests drive the real workflows against throwaway repositories
//! built with the `git` CLI in a temporary directory, and inspect the
//! results through libgit2.
//!
//! Tests skip gracefully if `git` is not installed.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{BranchType, Repository};
use tempfile::TempDir;

use gitaflow_core::consistency::Violation;
use gitaflow_core::errors::{CoreError, FlowError};
use gitaflow_core::flow::{self, FinishOptions, MergeOptions, RevertOptions, Selection};
use gitaflow_core::message::MergeMessage;
use gitaflow_core::{MergeType, Repo, TopicMerge};

// ===========================================================================
// Helpers
// ===========================================================================

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn twenty_lines() -> String {
    (1..=20).map(|i| format!("line {}\n", i)).collect()
}

/// Repository with one commit on master holding a 20-line `x.txt`.
fn setup_repo(tmp: &TempDir) -> PathBuf {
    let dir = tmp.path().join("work");
    std::fs::create_dir_all(&dir).unwrap();
    git(&dir, &["init", "-q"]);
    git(&dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git(&dir, &["config", "user.name", "Test User"]);
    git(&dir, &["config", "user.email", "test@example.com"]);
    git(&dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("x.txt"), twenty_lines()).unwrap();
    git(&dir, &["add", "x.txt"]);
    git(&dir, &["commit", "-q", "-m", "Initial commit"]);
    dir
}

/// Fresh context per step: commits made behind its back must not be hidden
/// by the read cache.
fn open(dir: &Path) -> Repo {
    Repo::open(dir, None).expect("failed to open repository")
}

fn commit_file(dir: &Path, name: &str, content: &str, message: &str) -> String {
    std::fs::write(dir.join(name), content).unwrap();
    git(dir, &["add", name]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

fn with_line_changed(line: usize, text: &str) -> String {
    (1..=20)
        .map(|i| {
            if i == line {
                format!("{}\n", text)
            } else {
                format!("line {}\n", i)
            }
        })
        .collect()
}

fn finish(dir: &Path, description: &str) -> Result<flow::FinishReport, CoreError> {
    let opts = FinishOptions {
        name: None,
        description: Some(description.to_string()),
        merge_type: None,
    };
    flow::finish(&open(dir), &opts)
}

/// init + start/commit/finish for every `(topic, file, content)`.
fn finished_topics(dir: &Path, topics: &[(&str, &str, &str)]) -> Vec<String> {
    flow::init(&open(dir), "1").unwrap();
    let mut heads = Vec::new();
    for (topic, file, content) in topics {
        flow::start(&open(dir), topic).unwrap();
        heads.push(commit_file(dir, file, content, &format!("Work on {}", topic)));
        finish(dir, &format!("topic {}", topic)).unwrap();
    }
    heads
}

fn user_message(err: &CoreError) -> String {
    match err {
        CoreError::Flow(FlowError::User(msg)) => msg.clone(),
        other => panic!("expected a user-facing refusal, got: {:?}", other),
    }
}

// ===========================================================================
// init / start / finish
// ===========================================================================

#[test]
fn test_init_start_finish() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);

    let it = flow::init(&open(&dir), "1").unwrap();
    assert_eq!(it.develop, "1/develop");
    assert_eq!(it.staging, "1/staging");

    let err = flow::init(&open(&dir), "2").unwrap_err();
    assert!(user_message(&err).contains("git-aflow repo already"));

    let branch = flow::start(&open(&dir), "a").unwrap();
    assert_eq!(branch, "1/a");
    let head = commit_file(&dir, "a.txt", "a\n", "Add a");

    let report = finish(&dir, "first topic").unwrap();
    assert_eq!(report.merge.rev.branch_name(), "1/a_v1");
    assert_eq!(report.merge.merge_type, MergeType::Euf);
    assert_eq!(report.deleted_branch.as_deref(), Some("1/a"));

    let g = Repository::open(&dir).unwrap();
    assert!(g.find_branch("1/a", BranchType::Local).is_err());
    let develop = g
        .find_branch("1/develop", BranchType::Local)
        .unwrap()
        .get()
        .peel_to_commit()
        .unwrap();
    assert_eq!(develop.parent_count(), 2);
    assert_eq!(develop.parent_id(1).unwrap().to_string(), head);
    assert_eq!(
        develop.message().unwrap().lines().next(),
        Some("Merge branch '1/a_v1' into 1/develop")
    );

    // the topic now lives in history; it cannot be started again
    let err = flow::start(&open(&dir), "a").unwrap_err();
    assert!(user_message(&err).contains("already exists in history"));
}

#[test]
fn test_finish_refusals() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    flow::init(&open(&dir), "1").unwrap();

    git(&dir, &["checkout", "-q", "1/develop"]);
    let err = finish(&dir, "nope").unwrap_err();
    assert!(user_message(&err).contains("Cannot finish"));

    flow::start(&open(&dir), "empty").unwrap();
    let err = finish(&dir, "nothing here").unwrap_err();
    assert!(user_message(&err).contains("at least one commit"));

    commit_file(&dir, "e.txt", "e\n", "Add e");
    std::fs::write(dir.join("e.txt"), "dirty\n").unwrap();
    let err = finish(&dir, "dirty").unwrap_err();
    assert!(user_message(&err).contains("Working tree is not clean"));
}

// ===========================================================================
// Revert and re-finish
// ===========================================================================

#[test]
fn test_refinish_reverted_revision_restores_single_merge() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    let heads = finished_topics(&dir, &[("a", "a.txt", "a\n")]);

    let report = flow::revert(
        &open(&dir),
        &RevertOptions {
            names: vec!["a".into()],
            dependencies: false,
        },
    )
    .unwrap();
    assert_eq!(report.reverted.len(), 1);
    assert!(open(&dir).effective_merges("1/develop", false, None).unwrap().is_empty());
    assert!(!dir.join("a.txt").exists());

    // no branch is left, so checkout lands on the merged head
    let checked_out = flow::checkout(&open(&dir), "a").unwrap();
    assert_eq!(checked_out, heads[0]);

    let report = finish(&dir, "second").unwrap();
    assert_eq!(report.deleted_branch, None);

    let merges = open(&dir).effective_merges("1/develop", false, None).unwrap();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].rev.branch_name(), "1/a_v1");
    assert_eq!(merges[0].rev_sha(), heads[0]);
    assert_eq!(merges[0].description.as_deref(), Some("second"));

    git(&dir, &["checkout", "-q", "1/develop"]);
    assert!(dir.join("a.txt").exists());
}

#[test]
fn test_refinish_reverted_topic_with_several_commits() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    flow::init(&open(&dir), "1").unwrap();
    flow::start(&open(&dir), "a").unwrap();
    commit_file(&dir, "a.txt", "a\n", "Add a");
    let head = commit_file(&dir, "a2.txt", "a2\n", "Add a2");
    finish(&dir, "first").unwrap();

    flow::revert(
        &open(&dir),
        &RevertOptions {
            names: vec!["a".into()],
            dependencies: false,
        },
    )
    .unwrap();
    assert!(!dir.join("a.txt").exists());
    assert!(!dir.join("a2.txt").exists());

    assert_eq!(flow::checkout(&open(&dir), "a").unwrap(), head);
    finish(&dir, "second").unwrap();

    let merges = open(&dir).effective_merges("1/develop", false, None).unwrap();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].rev_sha(), head);
    assert!(merges[0].is_fake());

    git(&dir, &["checkout", "-q", "1/develop"]);
    assert!(dir.join("a.txt").exists());
    assert!(dir.join("a2.txt").exists());
}

// ===========================================================================
// Conflict prediction
// ===========================================================================

#[test]
fn test_finish_rejects_conflicting_topic() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    finished_topics(&dir, &[("b", "x.txt", &with_line_changed(10, "b was here"))]);

    // a change far from b's hunk finishes fine
    flow::start(&open(&dir), "d").unwrap();
    commit_file(&dir, "x.txt", &with_line_changed(1, "d was here"), "Work on d");
    finish(&dir, "topic d").unwrap();

    flow::start(&open(&dir), "c").unwrap();
    commit_file(&dir, "x.txt", &with_line_changed(10, "c was here"), "Work on c");
    let develop_before = git(&dir, &["rev-parse", "1/develop"]);

    let err = finish(&dir, "topic c").unwrap_err();
    match err {
        CoreError::Flow(FlowError::Conflict { first, second, file }) => {
            let mut names = vec![first, second];
            names.sort();
            assert_eq!(names, vec!["1/b_v1".to_string(), "1/c_v1".to_string()]);
            assert!(file.ends_with("x.txt"), "unexpected file {}", file);
        }
        other => panic!("expected a conflict, got: {:?}", other),
    }

    // nothing was touched
    assert_eq!(git(&dir, &["rev-parse", "1/develop"]), develop_before);
    assert_eq!(git(&dir, &["rev-parse", "--abbrev-ref", "HEAD"]), "1/c");
}

// ===========================================================================
// Consistency
// ===========================================================================

#[test]
fn test_consistency_detects_same_revision_with_different_heads() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    finished_topics(&dir, &[("a", "a.txt", "a\n")]);

    // a forged merge of 1/a_v1 with another head
    git(&dir, &["checkout", "-q", "-b", "forged", "1"]);
    commit_file(&dir, "a.txt", "forged\n", "Forged a");
    git(&dir, &["checkout", "-q", "1/staging"]);
    let message = MergeMessage {
        branch: "1/a_v1".into(),
        target: Some("1/staging".into()),
        merge_type: MergeType::Euf,
        description: None,
    }
    .to_string();
    git(&dir, &["merge", "-q", "--no-ff", "-m", &message, "forged"]);

    let repo = open(&dir);
    let report = repo.check_consistency(&["1/develop", "1/staging"]).unwrap();
    assert!(!report.is_ok());
    assert!(report
        .violations
        .iter()
        .any(|v| matches!(v, Violation::ShaMismatch { revision, .. } if revision.contains("a_v1"))));

    assert!(repo.check_consistency(&["1/develop"]).unwrap().is_ok());

    // merging from develop into the inconsistent staging is refused
    let err = flow::merge(
        &repo,
        &MergeOptions {
            sources: vec![],
            selection: Selection::All,
            dependencies: false,
            merge_type: None,
            description: None,
        },
    )
    .unwrap_err();
    assert!(user_message(&err).contains("fix aforementioned problems"));
}

// ===========================================================================
// Effective merges
// ===========================================================================

#[test]
fn test_effective_merges_are_stable_across_queries() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    finished_topics(&dir, &[("a", "a.txt", "a\n"), ("b", "b.txt", "b\n")]);

    let repo = open(&dir);
    let first = repo.effective_merges("1/develop", false, None).unwrap();
    let second = repo.effective_merges("1/develop", false, None).unwrap();
    let fresh = open(&dir).effective_merges("1/develop", false, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, fresh);

    let names: Vec<String> = first.iter().map(|m| m.rev.branch_name()).collect();
    assert_eq!(names, vec!["1/a_v1", "1/b_v1"]);
    assert_eq!(first[1].description.as_deref(), Some("topic b"));
}

// ===========================================================================
// Dependencies
// ===========================================================================

/// `a` finished, `b` built on a merge of `a` and finished too.
fn dependent_topics(dir: &Path) {
    finished_topics(dir, &[("a", "a.txt", "a\n")]);
    flow::start(&open(dir), "b").unwrap();
    commit_file(dir, "b.txt", "b\n", "Work on b");
    flow::merge(
        &open(dir),
        &MergeOptions {
            sources: vec![],
            selection: Selection::Choose(vec!["a".into()]),
            dependencies: false,
            merge_type: None,
            description: None,
        },
    )
    .unwrap();
    finish(dir, "topic b").unwrap();
}

#[test]
fn test_merge_pulls_dependencies_only_when_asked() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    dependent_topics(&dir);

    flow::checkout(&open(&dir), "staging").unwrap();
    let choose_b = |dependencies| MergeOptions {
        sources: vec![],
        selection: Selection::Choose(vec!["b".into()]),
        dependencies,
        merge_type: None,
        description: None,
    };

    let err = flow::merge(&open(&dir), &choose_b(false)).unwrap_err();
    assert!(
        matches!(err, CoreError::Flow(FlowError::MissingDependency { .. })),
        "unexpected error: {:?}",
        err
    );

    let report = flow::merge(&open(&dir), &choose_b(true)).unwrap();
    let merged: Vec<String> = report.merged.iter().map(|m| m.rev.branch_name()).collect();
    assert_eq!(merged, vec!["1/a_v1", "1/b_v1"]);

    let staging: Vec<String> = open(&dir)
        .effective_merges("1/staging", false, None)
        .unwrap()
        .iter()
        .map(|m| m.rev.branch_name())
        .collect();
    assert_eq!(staging, vec!["1/a_v1", "1/b_v1"]);
}

#[test]
fn test_recursive_effective_merges_include_dependencies() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    dependent_topics(&dir);

    let develop = open(&dir).effective_merges("1/develop", false, None).unwrap();
    let b = develop.iter().find(|m| m.rev.topic.name == "b").unwrap().clone();

    // b alone, merged next to the iteration base
    git(&dir, &["checkout", "-q", "-b", "side", "1"]);
    let message = MergeMessage {
        branch: "1/b_v1".into(),
        target: Some("side".into()),
        merge_type: MergeType::Euf,
        description: None,
    }
    .to_string();
    git(&dir, &["merge", "-q", "--no-ff", "-m", &message, b.rev_sha()]);

    let repo = open(&dir);
    let names = |merges: Vec<TopicMerge>| -> Vec<String> { merges.iter().map(|m| m.rev.branch_name()).collect() };
    assert_eq!(names(repo.effective_merges("side", false, Some("1")).unwrap()), vec!["1/b_v1"]);
    assert_eq!(
        names(repo.effective_merges("side", true, Some("1")).unwrap()),
        vec!["1/a_v1", "1/b_v1"]
    );
    assert_eq!(names(repo.own_effective_merges(&b.rev, true).unwrap()), vec!["1/a_v1"]);
}

#[test]
fn test_revert_requires_dependents_flag() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    dependent_topics(&dir);

    let revert_a = |dependencies| RevertOptions {
        names: vec!["a".into()],
        dependencies,
    };

    let err = flow::revert(&open(&dir), &revert_a(false)).unwrap_err();
    let msg = user_message(&err);
    assert!(msg.contains("Unable to revert 1/a_v1"), "{}", msg);
    assert!(msg.contains("1/b_v1"), "{}", msg);

    let report = flow::revert(&open(&dir), &revert_a(true)).unwrap();
    let reverted: Vec<String> = report.reverted.iter().map(|m| m.rev.branch_name()).collect();
    assert_eq!(reverted, vec!["1/b_v1", "1/a_v1"]);

    let repo = open(&dir);
    assert!(repo.effective_merges("1/develop", false, None).unwrap().is_empty());
    let last = repo.revert_from_treeish("1/develop").unwrap().unwrap();
    assert_eq!(last.rev.branch_name(), "1/a_v1");
}

// ===========================================================================
// Versions
// ===========================================================================

/// `a` and `b` finished, then `a_v2` (touching line 10 of `x.txt`) finished.
fn two_versions_of_a(dir: &Path) {
    finished_topics(dir, &[("a", "a.txt", "a\n"), ("b", "b.txt", "b\n")]);
    assert_eq!(flow::continue_topic(&open(dir), Some("a")).unwrap(), "1/a_v2");
    commit_file(dir, "x.txt", &with_line_changed(10, "a v2"), "Work on a v2");
    finish(dir, "topic a v2").unwrap();
}

fn choose(topics: &[&str]) -> MergeOptions {
    MergeOptions {
        sources: vec![],
        selection: Selection::Choose(topics.iter().map(|t| t.to_string()).collect()),
        dependencies: false,
        merge_type: None,
        description: None,
    }
}

fn merged_names(report: &flow::MergeReport) -> Vec<String> {
    report.merged.iter().map(|m| m.rev.branch_name()).collect()
}

#[test]
fn test_merge_brings_elder_versions_along() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    two_versions_of_a(&dir);

    flow::checkout(&open(&dir), "staging").unwrap();
    let report = flow::merge(&open(&dir), &choose(&["a"])).unwrap();
    assert_eq!(merged_names(&report), vec!["1/a_v1", "1/a_v2"]);

    // a newer version without its elder in the sources is refused
    let repo = open(&dir);
    let ci = repo.current_iteration().unwrap().unwrap();
    let v2 = repo
        .effective_merges("1/develop", false, None)
        .unwrap()
        .into_iter()
        .find(|m| m.rev.branch_name() == "1/a_v2")
        .unwrap();
    let err = repo
        .with_elder_versions(&[v2.clone()], &[], &[v2.clone()], &ci)
        .unwrap_err();
    match err {
        CoreError::Flow(FlowError::MissingElderVersion { revision, elder }) => {
            assert_eq!(revision, "1/a_v2");
            assert_eq!(elder, "1/a_v1");
        }
        other => panic!("expected a missing elder version, got: {:?}", other),
    }

    // nothing to insert when the destination already has v1
    let v1 = repo
        .effective_merges("1/develop", false, None)
        .unwrap()
        .into_iter()
        .find(|m| m.rev.branch_name() == "1/a_v1")
        .unwrap();
    let plan = repo.with_elder_versions(&[v2.clone()], &[v1], &[v2], &ci).unwrap();
    assert_eq!(plan.len(), 1);
}

#[test]
fn test_merge_update_takes_only_newer_versions() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    two_versions_of_a(&dir);

    flow::checkout(&open(&dir), "staging").unwrap();
    flow::merge(&open(&dir), &choose(&["a_v1"])).unwrap();

    let update = MergeOptions {
        sources: vec![],
        selection: Selection::Update,
        dependencies: false,
        merge_type: None,
        description: None,
    };
    let report = flow::merge(&open(&dir), &update).unwrap();
    assert_eq!(merged_names(&report), vec!["1/a_v2"]);

    // b was never in staging, so update leaves it out
    let staging = open(&dir).effective_merges("1/staging", false, None).unwrap();
    assert!(staging.iter().all(|m| m.rev.topic.name != "b"));

    let err = flow::merge(&open(&dir), &update).unwrap_err();
    assert!(user_message(&err).contains("nothing to merge"));
}

#[test]
fn test_conflict_in_staging_resets_it() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    finished_topics(&dir, &[("b", "x.txt", &with_line_changed(10, "b was here"))]);

    flow::checkout(&open(&dir), "staging").unwrap();
    let before = commit_file(&dir, "x.txt", &with_line_changed(10, "hotfix"), "Hotfix in staging");

    let err = flow::merge(&open(&dir), &choose(&["b"])).unwrap_err();
    assert!(
        matches!(&err, CoreError::Flow(FlowError::UnexpectedConflict(msg)) if msg.contains("1/staging reset")),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(git(&dir, &["rev-parse", "1/staging"]), before);
    assert_eq!(git(&dir, &["status", "--porcelain"]), "");
}

#[test]
fn test_failed_replay_of_reverted_versions_resets_topic_branch() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);
    two_versions_of_a(&dir);

    flow::start(&open(&dir), "t").unwrap();
    let report = flow::merge(&open(&dir), &choose(&["a"])).unwrap();
    assert_eq!(merged_names(&report), vec!["1/a_v1", "1/a_v2"]);
    let report = flow::revert(
        &open(&dir),
        &RevertOptions {
            names: vec!["a".into()],
            dependencies: false,
        },
    )
    .unwrap();
    assert_eq!(report.reverted.len(), 2);
    let before = commit_file(&dir, "x.txt", &with_line_changed(10, "t was here"), "Work on t");

    // v1 re-applies cleanly, v2 conflicts with t's own change
    let err = flow::merge(&open(&dir), &choose(&["a"])).unwrap_err();
    assert!(
        matches!(err, CoreError::Flow(FlowError::UnexpectedConflict(_))),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(git(&dir, &["rev-parse", "1/t"]), before);
    assert_eq!(git(&dir, &["rev-parse", "--abbrev-ref", "HEAD"]), "1/t");
    assert_eq!(git(&dir, &["status", "--porcelain"]), "");
    assert!(open(&dir).effective_merges("1/t", false, None).unwrap().is_empty());
}

// ===========================================================================
// Iterations
// ===========================================================================

#[test]
fn test_rebase_starts_next_iteration() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let dir = setup_repo(&tmp);

    let err = flow::rebase(&open(&dir), "2").unwrap_err();
    assert!(user_message(&err).contains("git af init"));

    flow::init(&open(&dir), "1").unwrap();
    git(&dir, &["checkout", "-q", "master"]);
    commit_file(&dir, "release.txt", "1\n", "Release 1");
    let second = flow::rebase(&open(&dir), "2").unwrap();

    let repo = open(&dir);
    let names: Vec<String> = repo.iterations(true).unwrap().into_iter().map(|it| it.name).collect();
    assert_eq!(names, vec!["1", "2"]);
    assert_eq!(repo.last_iteration().unwrap(), Some(second.clone()));
    assert_eq!(repo.prev_iteration(&second).unwrap().map(|it| it.name), Some("1".to_string()));
    assert_eq!(repo.current_iteration().unwrap(), Some(second));

    // a topic started now is based on the new base point
    assert_eq!(flow::start(&repo, "t").unwrap(), "2/t");
    assert_eq!(git(&dir, &["rev-parse", "HEAD"]), git(&dir, &["rev-parse", "2"]));
}
