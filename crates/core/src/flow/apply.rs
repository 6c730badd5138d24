//! Applying a topic revision to the current branch.

use tracing::{debug, info, instrument};

use crate::errors::{CoreError, FlowError, ModelError};
use crate::message::{MergeMessage, MERGE_GREP, REVERT_GREP};
use crate::models::{CommitRecord, MergeType, TopicMerge, TopicRevert, TopicRevision};
use crate::repo::Repo;

use super::{check_current_branch, check_iteration};

/// Merge `rev` into the current branch.
///
/// Reverted revisions of the same topic newer than the last effective one
/// and not newer than `rev` are re-applied first, oldest version first, by
/// reverting their reverts. Each re-application is committed as a fake
/// merge (merge headline, single parent). When `rev` itself is re-applied
/// that way the fake merge is the result; otherwise `rev` is merged for
/// real.
///
/// Returns `None` when the final real merge conflicted; the conflicted
/// state is left in place with `MERGE_MSG` prepared. A failure while
/// re-applying reverted revisions resets the branch to where it was and
/// returns an error. Does not check whether `rev` is already merged.
#[instrument(skip(repo), fields(revision = %rev))]
pub fn merge_revision(
    repo: &Repo,
    rev: &TopicRevision,
    description: Option<&str>,
    merge_type: MergeType,
) -> Result<Option<TopicMerge>, CoreError> {
    let git = repo.git();
    let branch = check_current_branch(repo)?;
    let iteration = check_iteration(repo)?;
    let target = if repo.is_master(&branch) { None } else { Some(branch.clone()) };

    let head = git.current_sha()?;
    let mut reverts: Vec<TopicRevert> = Vec::new();
    let mut last_effective: Option<TopicMerge> = None;
    for sha in git.commits_between(&iteration.name, &head, false, &[REVERT_GREP, MERGE_GREP])? {
        match repo.commit_record(&sha)? {
            CommitRecord::Revert(r) if r.rev.topic == rev.topic && !r.rev.is_in_reverts(&reverts) => {
                reverts.push(r);
            }
            CommitRecord::Merge(m)
                if last_effective.is_none() && m.rev.topic == rev.topic && !m.rev.is_in_reverts(&reverts) =>
            {
                last_effective = Some(m);
            }
            _ => {}
        }
    }

    let effective_version = last_effective.map_or(0, |m| m.rev.version);
    let mut to_reapply: Vec<TopicRevert> = reverts
        .into_iter()
        .filter(|r| effective_version < r.rev.version && r.rev.version <= rev.version)
        .collect();
    to_reapply.sort_by_key(|r| r.rev.version);

    let mut last_reapplied: Option<TopicMerge> = None;
    for revert in &to_reapply {
        let reverted = repo.reverted_merge(revert)?.ok_or_else(|| {
            ModelError::IncompleteMergeObject(format!("cannot find merge reverted by {}", revert))
        })?;
        info!(merge = %reverted, "re-applying reverted merge");
        let (desc, kind) = if reverted.rev == *rev {
            (description.map(String::from).or_else(|| reverted.description.clone()), merge_type)
        } else {
            (reverted.description.clone(), reverted.merge_type)
        };
        let message = MergeMessage {
            branch: reverted.rev.branch_name(),
            target: target.clone(),
            merge_type: kind,
            description: desc,
        }
        .to_string();

        if !git.revert(&revert.sha, None, true)?.is_applied() {
            rollback(repo, &head)?;
            return Err(FlowError::UnexpectedConflict(format!(
                "Re-applying {} conflicted while reverting {}. Branch {} reset.",
                reverted.rev.branch_name(),
                revert,
                branch
            ))
            .into());
        }
        if let Err(e) = git.set_merge_msg(&message) {
            rollback(repo, &head)?;
            return Err(FlowError::MergeNonConflict(e.to_string()).into());
        }
        if !git.commit(Some(&message), true)? {
            rollback(repo, &head)?;
            return Err(FlowError::MergeNonConflict(format!("failed to commit while reverting {}", revert)).into());
        }
        last_reapplied = Some(reverted);
    }

    if let Some(reverted) = last_reapplied {
        if reverted.rev == *rev {
            debug!("revision re-applied by fake merge");
            return repo.merge_from_treeish("HEAD");
        }
    }

    let sha = rev
        .sha
        .as_deref()
        .ok_or_else(|| FlowError::MergeNonConflict(format!("cannot merge {} without its head SHA", rev)))?;
    let message = MergeMessage {
        branch: rev.branch_name(),
        target: target.clone(),
        merge_type,
        description: description.map(String::from),
    }
    .to_string();
    info!(revision = %rev, into = %branch, "merging");
    if git.merge(sha, &message)?.is_applied() {
        return Ok(Some(TopicMerge {
            rev: rev.clone(),
            sha: git.current_sha()?,
            description: description.map(String::from),
            merge_type,
            target: branch,
        }));
    }
    // keep git from appending a "Conflicts:" section
    if let Err(e) = git.set_merge_msg(&message) {
        git.abort_merge()?;
        return Err(FlowError::MergeNonConflict(e.to_string()).into());
    }
    Ok(None)
}

/// Drop a half-done revert and any fake merges committed before it.
fn rollback(repo: &Repo, head: &str) -> Result<(), CoreError> {
    let git = repo.git();
    git.abort_revert()?;
    git.reset_hard(head)?;
    info!(head = %head, "replay of reverted merges rolled back");
    Ok(())
}
