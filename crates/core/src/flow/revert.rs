//! `git af revert`: revert topic merges from the current branch.

use tracing::{debug, info, instrument, warn};

use crate::errors::{user_error, CoreError, FlowError};
use crate::models::{Topic, TopicMerge};
use crate::repo::Repo;

use super::{check_current_branch, check_iteration, ensure_consistent, parse_revision, say};

#[derive(Debug, Clone, Default)]
pub struct RevertOptions {
    /// `topic` reverts every version, `topic_vN` that version and newer.
    pub names: Vec<String>,
    /// Also revert topics depending on the reverted ones.
    pub dependencies: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RevertReport {
    pub reverted: Vec<TopicMerge>,
}

/// Merges in `merges` whose revision is built on top of `merge`'s,
/// transitively, deepest first.
fn dependents(repo: &Repo, merge: &TopicMerge, merges: &[TopicMerge]) -> Result<Vec<TopicMerge>, CoreError> {
    let mut result = Vec::new();
    for m in merges {
        if repo.git().is_ancestor(merge.rev_sha(), m.rev_sha())? {
            result.extend(dependents(repo, m, merges)?);
            result.push(m.clone());
        }
    }
    debug!(merge = %merge, dependents = result.len(), "dependents found");
    Ok(result)
}

#[instrument(skip(repo))]
pub fn revert(repo: &Repo, opts: &RevertOptions) -> Result<RevertReport, CoreError> {
    let git = repo.git();
    let ci = check_iteration(repo)?;
    let cb = check_current_branch(repo)?;
    ensure_consistent(repo, &[cb.as_str()])?;

    // 0 stands for "every version"
    let mut ver_by_t: Vec<(Topic, u32)> = Vec::new();
    for n in &opts.names {
        let rev = parse_revision(repo, n, None, None)?;
        if ver_by_t.iter().any(|(t, _)| *t == rev.topic) {
            return user_error(format!("Error: topic {} specified more than once", rev.topic));
        }
        let version = if rev.default_version { 0 } else { rev.version };
        ver_by_t.push((rev.topic, version));
    }
    info!(revisions = ?ver_by_t, "scanning for merges to revert");

    let own_merges = repo.effective_merges(&cb, false, None)?;
    let mut to_revert: Vec<TopicMerge> = Vec::new();
    for (topic, version) in &ver_by_t {
        let found: Vec<&TopicMerge> = own_merges
            .iter()
            .filter(|m| m.rev.topic == *topic && (*version == 0 || *version <= m.rev.version))
            .collect();
        if *version > 0 && !found.iter().any(|m| m.rev.version == *version) {
            return user_error(format!(
                "Didn't found non-reverted merges of {}_v{} in {}",
                topic, version, cb
            ));
        }
        if found.is_empty() {
            return user_error(format!("Didn't found non-reverted merges of {} in {}", topic, cb));
        }
        to_revert.extend(found.into_iter().cloned());
    }

    let mut with_deps: Vec<TopicMerge> = Vec::new();
    for m in &to_revert {
        let mut chain = dependents(repo, m, &own_merges)?;
        chain.push(m.clone());
        for d in chain {
            if d.rev.is_in_merges(&with_deps) {
                continue;
            }
            if d.rev.is_in_merges(&to_revert) || opts.dependencies {
                with_deps.push(d);
            } else {
                return user_error(format!(
                    "Unable to revert {} since {} depends on it. Revert it first or use \"git af revert -d\" \
                     to revert dependent topics automatically.",
                    m.rev.branch_name(),
                    d.rev.branch_name()
                ));
            }
        }
    }

    // a topic must leave the upstream branch first
    let upstream = if repo.is_develop(&cb)? {
        Some((ci.staging.clone(), repo.effective_merges(&ci.staging, false, None)?))
    } else if repo.is_staging(&cb)? {
        let head = repo.master_head(&ci)?;
        Some((repo.master().to_string(), repo.effective_merges(&head, false, None)?))
    } else {
        None
    };
    if let Some((name, merges)) = &upstream {
        for m in &with_deps {
            if m.rev.is_in_merges(merges) {
                return user_error(format!(
                    "Error: {} is merged in {}. In git-aflow you cannot revert a topic until it is reverted \
                     from the upstream branch.",
                    m.rev.branch_name(),
                    name
                ));
            }
        }
    }

    let fallback_sha = git.current_sha()?;
    let mut report = RevertReport::default();
    for m in with_deps {
        info!(revision = %m.rev, "reverting");
        let mainline = if git.parent(&m.sha, 2)?.is_some() { Some(1) } else { None };
        if git.revert(&m.sha, mainline, false)?.is_applied() {
            say(format!("{} reverted successfully.", m.rev.branch_name()));
            report.reverted.push(m);
        } else {
            warn!(revision = %m.rev, fallback = %fallback_sha, "revert conflicted, rolling back");
            git.abort_revert()?;
            git.reset_hard(&fallback_sha)?;
            return Err(FlowError::UnexpectedConflict(format!(
                "Revert of {} failed unexpectedly. Reverts aborted, {} reset.",
                m.rev.branch_name(),
                cb
            ))
            .into());
        }
    }
    Ok(report)
}
