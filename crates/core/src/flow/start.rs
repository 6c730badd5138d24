//! `git af start`: create a topic branch at the iteration base point.

use tracing::{error, info, instrument};

use crate::errors::{user_error, CoreError};
use crate::models::Topic;
use crate::repo::Repo;

use super::{check_iteration, check_topic_name_valid, check_untracked_not_differ, check_working_tree_clean, say, topic_branches};

/// Returns the name of the created branch, now checked out.
#[instrument(skip(repo))]
pub fn start(repo: &Repo, name: &str) -> Result<String, CoreError> {
    let git = repo.git();
    let ci = check_iteration(repo)?;
    let branch_name = format!("{}/{}", ci, name);

    check_topic_name_valid(repo, &branch_name)?;
    check_working_tree_clean(repo)?;
    check_untracked_not_differ(repo, &ci.name)?;

    let topic = Topic::new(name);
    for b in topic_branches(repo, &topic)? {
        if repo.iteration_by_treeish(&b)?.as_ref() == Some(&ci) {
            return user_error(format!(
                "Cannot start topic, it already has a branch({}) in current iteration({}).",
                b, ci
            ));
        }
    }

    let merges = repo.topic_merges_everywhere(&topic)?;
    if !merges.is_empty() {
        let shas: Vec<&str> = merges.iter().map(|m| m.sha.as_str()).collect();
        return user_error(format!(
            "Cannot start topic, it already exists in history, see SHA: {}",
            shas.join(", ")
        ));
    }

    info!(branch = %branch_name, "creating topic branch");
    git.create_branch(&branch_name, &ci.name)?;
    if let Err(e) = git.checkout(&branch_name) {
        error!(error = %e, "cannot check out new topic branch, deleting it");
        git.delete_branch(&branch_name)?;
        return Err(e.into());
    }
    say(format!("Topic {} created. You are in {} branch", name, branch_name));
    Ok(branch_name)
}
