//! `git af checkout`: switch to a branch, topic or merged revision.

use tracing::{info, instrument};

use crate::errors::{user_error, CoreError};
use crate::iteration::Iteration;
use crate::models::TopicMerge;
use crate::repo::Repo;

use super::{check_iteration, check_untracked_not_differ, check_working_tree_clean, parse_revision, say, topic_branches};

/// Lookup order: a branch of that name, the current iteration's develop or
/// staging, the newest branch of the topic (or the exact revision's branch
/// when a version is given), and finally the head of the merged revision
/// (detached). Returns what was checked out.
#[instrument(skip(repo))]
pub fn checkout(repo: &Repo, name: &str) -> Result<String, CoreError> {
    let git = repo.git();
    check_working_tree_clean(repo)?;
    let ci = check_iteration(repo)?;

    if git.branch_exists(name)? {
        info!(branch = name, "found branch");
        return switch(repo, &ci, name);
    }
    let completed = repo.complete_branch_name(name, &ci.name);
    if completed != name && git.branch_exists(&completed)? {
        info!(branch = %completed, "found iteration branch");
        return switch(repo, &ci, &completed);
    }

    let rev = parse_revision(repo, name, None, Some(&ci))?;
    info!(revision = %rev, "searching for branch of revision");
    let mut last_version = 0;
    let mut last_name: Option<String> = None;
    for b in topic_branches(repo, &rev.topic)? {
        let b_rev = match repo.revision_from_branch_name(&b, None, None) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if rev.default_version {
            if b_rev.iteration == rev.iteration && b_rev.version > last_version {
                last_version = b_rev.version;
                last_name = Some(b);
            }
        } else if !b_rev.default_version && b_rev == rev {
            last_name = Some(b);
        }
    }
    if let Some(b) = last_name {
        return switch(repo, &ci, &b);
    }

    let develop = match &rev.iteration {
        Some(it) => repo.iteration(it).develop,
        None => ci.develop.clone(),
    };
    info!(develop = %develop, "no branch found, looking for merged revisions");
    let mut last_m: Option<TopicMerge> = None;
    for m in repo.all_merges_in(&develop)? {
        if m.is_fake() || m.rev.topic != rev.topic {
            continue;
        }
        if rev.default_version {
            if last_m.as_ref().map_or(true, |l| l.rev.version < m.rev.version) {
                last_m = Some(m);
            }
        } else if m.rev == rev {
            last_m = Some(m);
            break;
        }
    }
    match last_m {
        Some(m) => switch(repo, &ci, m.rev_sha()),
        None => user_error(format!("Failed to found {} in iteration {}.", name, ci)),
    }
}

fn switch(repo: &Repo, ci: &Iteration, treeish: &str) -> Result<String, CoreError> {
    check_untracked_not_differ(repo, treeish)?;
    repo.git().checkout(treeish)?;
    let new_ci = check_iteration(repo)?;
    if new_ci != *ci {
        say(format!("Iteration switched from {} to {}", ci, new_ci));
    }
    match repo.git().current_branch()? {
        Some(b) => say(format!("{} checked out.", b)),
        None => say(format!("{} checked out. You are in \"detached HEAD\" state now.", treeish)),
    }
    Ok(treeish.to_string())
}
