//! `git af continue`: branch off the next version of a topic.

use tracing::{error, info, instrument};

use crate::errors::{user_error, CoreError};
use crate::iteration::Iteration;
use crate::models::{TopicMerge, TopicRevision};
use crate::repo::Repo;

use super::{check_iteration, check_untracked_not_differ, check_working_tree_clean, parse_revision, say};

/// Find the last merged revision of `name` (or of the revision HEAD points
/// at) and create `<iteration>/<topic>_v<next>` from its head, or from the
/// base point when that head predates it. Returns the new branch name.
#[instrument(skip(repo))]
pub fn continue_topic(repo: &Repo, name: Option<&str>) -> Result<String, CoreError> {
    let git = repo.git();
    let head = git.current_sha()?;

    let (ci, last_m) = match name {
        Some(name) => {
            let nr = parse_revision(repo, name, None, None)?;
            let ci = match &nr.iteration {
                Some(it) => repo.iteration(it),
                None => check_iteration(repo)?,
            };
            if !nr.default_version {
                say("Version suffix ignored.");
            }
            let cd_all = repo.all_merges_in(&ci.develop)?;
            let last = match nr.topic.latest_merge(&cd_all, true) {
                Some(m) => m.clone(),
                None => latest_in_master(repo, &ci, &nr)?,
            };
            (ci, last)
        }
        None => {
            let ci = check_iteration(repo)?;
            let found = repo
                .all_merges_in(&ci.develop)?
                .into_iter()
                .find(|m| m.rev.sha.as_deref() == Some(head.as_str()));
            match found {
                Some(m) => (ci, m),
                None => {
                    return user_error(
                        "No topic name was specified, neither HEAD is pointing to last commit of some topic. \
                         Nothing to continue.",
                    )
                }
            }
        }
    };
    info!(last = %last_m.rev, "found revision to continue");

    let last_sha = last_m.rev_sha();
    let start = if git.is_ancestor(last_sha, &ci.name)? {
        ci.name.clone()
    } else {
        last_sha.to_string()
    };
    let new_r = TopicRevision::new(
        last_m.rev.topic.clone(),
        Some(start.clone()),
        Some(last_m.rev.version + 1),
        Some(ci.name.clone()),
    );
    let tb_name = new_r.branch_name();
    if git.branch_exists(&tb_name)? {
        return user_error(format!(
            "{} already exists. Use \"git af checkout {}\" to continue your work on topic",
            tb_name, tb_name
        ));
    }
    if head != git.rev_parse(&start)? {
        check_working_tree_clean(repo)?;
        check_untracked_not_differ(repo, &start)?;
    }

    let everywhere = repo.topic_merges_everywhere(&new_r.topic)?;
    if let Some(latest) = new_r.topic.latest_merge(&everywhere, false) {
        if latest.rev.version >= new_r.version {
            say(format!(
                "Please, note that {}_v{} is already present in other iteration(s), so changes you will make \
                 for this revision in current iteration should correspond to changes made for same revision \
                 in other iterations.",
                new_r.topic, new_r.version
            ));
        }
    }

    git.create_branch(&tb_name, &start)?;
    if let Err(e) = git.checkout(&tb_name) {
        error!(error = %e, "failed to check out new branch, deleting it");
        git.delete_branch(&tb_name)?;
        return Err(e.into());
    }
    say(format!(
        "{} created and checked out. Use \"git af finish\" to merge new revision of topic into develop",
        tb_name
    ));
    Ok(tb_name)
}

/// Newest merge of the topic into master before `ci`, walking back one
/// iteration at a time.
fn latest_in_master(repo: &Repo, ci: &Iteration, nr: &TopicRevision) -> Result<TopicMerge, CoreError> {
    let mut earlier: Vec<Iteration> = Vec::new();
    for it in repo.iterations(true)? {
        if repo.git().is_ancestor(&it.name, &ci.name)? {
            earlier.push(it);
        }
    }
    earlier.reverse();
    // nothing precedes the first iteration
    let searched: Vec<&Iteration> = if earlier.is_empty() {
        Vec::new()
    } else {
        std::iter::once(ci).chain(earlier.iter().take(earlier.len() - 1)).collect()
    };
    for it in searched {
        let merges = repo.effective_merges(&it.name, false, None)?;
        if let Some(m) = nr.topic.latest_merge(&merges, false) {
            info!(merge = %m, before = %it, "found effective merge in master");
            return Ok(m.clone());
        }
    }
    let mut names = vec![ci.name.clone()];
    names.extend(earlier.iter().map(|it| it.name.clone()));
    user_error(format!(
        "Failed to find merges of {} in iterations: {}.",
        nr.topic,
        names.join(", ")
    ))
}
