//! `git af merge`: bring topics from sources into the current branch.

use tracing::{error, info, instrument};

use crate::errors::{user_error, CoreError, FlowError};
use crate::models::{MergeType, Topic, TopicMerge};
use crate::repo::Repo;

use super::apply::merge_revision;
use super::{
    check_current_branch, check_iteration, check_working_tree_clean, default_sources, ensure_consistent,
    parse_revision, say,
};

/// Which source merges to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every topic whose version in the sources is newer than ours.
    All,
    /// Only topics we already have, when the sources hold a newer version.
    Update,
    /// Explicit `topic[_vN]` selectors; unversioned ones take the newest
    /// version found in the sources.
    Choose(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub sources: Vec<String>,
    pub selection: Selection,
    /// Merge missing dependencies ahead of the topics requiring them.
    pub dependencies: bool,
    pub merge_type: Option<MergeType>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub merged: Vec<TopicMerge>,
}

#[instrument(skip(repo))]
pub fn merge(repo: &Repo, opts: &MergeOptions) -> Result<MergeReport, CoreError> {
    let git = repo.git();
    let cb = check_current_branch(repo)?;

    let single_topic = matches!(&opts.selection, Selection::Choose(t) if t.len() == 1);
    if (opts.merge_type.is_some() || opts.description.is_some()) && !single_topic {
        return user_error(
            "If you are going to specify topic description and/or type, you should merge one single topic",
        );
    }
    check_working_tree_clean(repo)?;
    let ci = check_iteration(repo)?;
    if repo.is_develop(&cb)? {
        return user_error("You cannot merge into develop, use git af finish instead");
    }

    let sources = if opts.sources.is_empty() {
        default_sources(repo)?
    } else {
        opts.sources.clone()
    };
    let sources: Vec<String> = sources
        .iter()
        .map(|s| repo.complete_branch_name(s, &ci.name))
        .collect();
    for source in &sources {
        if !git.branch_exists(source)? {
            return user_error(format!("Merge source {} does not exist.", source));
        }
        if repo.iteration_by_branch(source)?.as_ref() != Some(&ci) {
            return user_error(format!(
                "Merge sources should belong to current iteration. {} doesn't.",
                source
            ));
        }
    }

    let mut checked: Vec<&str> = sources.iter().map(String::as_str).collect();
    checked.push(&cb);
    ensure_consistent(repo, &checked)?;

    // Topics we have, including those merged into our own history
    let first = repo.first_iteration()?.map_or_else(|| ci.name.clone(), |it| it.name);
    let mut own_merges = repo.effective_merges(&cb, false, Some(&first))?;
    let protected = repo.is_master(&cb) || repo.is_staging(&cb)? || repo.is_release(&cb);
    if !protected && git.current_sha()? != git.rev_parse(&ci.name)? {
        let cb_sha = git.rev_parse(&cb)?;
        for m in repo.all_merges_in(&ci.develop)? {
            if let Some(sha) = m.rev.sha.as_deref() {
                if sha == cb_sha || git.is_based_on(sha, &cb)? {
                    info!(revision = %m.rev, "excluding from merge");
                    own_merges.push(m);
                }
            }
        }
    }

    let mut source_merges = Vec::new();
    for s in &sources {
        source_merges.extend(repo.effective_merges(s, false, None)?);
    }

    let mut to_commit: Vec<TopicMerge> = Vec::new();
    let mut chosen_topic: Option<Topic> = None;
    match &opts.selection {
        Selection::All => {
            for m in &source_merges {
                if m.is_newest_in(own_merges.iter().chain(to_commit.iter())) {
                    info!(merge = %m, "adding to merge");
                    to_commit.push(m.clone());
                }
            }
        }
        Selection::Update => {
            for m in &source_merges {
                let mut newer = false;
                let mut have_it = false;
                for have in own_merges.iter().chain(to_commit.iter()) {
                    if have.rev.topic == m.rev.topic {
                        if m.rev.version > have.rev.version {
                            newer = true;
                        } else {
                            have_it = true;
                            break;
                        }
                    }
                }
                if newer && !have_it {
                    info!(merge = %m, "adding to merge");
                    to_commit.push(m.clone());
                }
            }
        }
        Selection::Choose(topics) => {
            for t in topics {
                let rev = parse_revision(repo, t, None, Some(&ci))?;
                if single_topic {
                    chosen_topic = Some(rev.topic.clone());
                }
                let found = if rev.default_version {
                    rev.topic.latest_merge(&source_merges, false)
                } else {
                    source_merges.iter().find(|m| m.rev == rev)
                };
                let found = match found {
                    Some(m) => m.clone(),
                    None => {
                        return user_error(format!(
                            "Merge failed. No topic {} in sources {}",
                            t,
                            sources.join(", ")
                        ))
                    }
                };
                if found.is_newest_in(own_merges.iter().chain(to_commit.iter())) {
                    to_commit.push(found);
                } else if rev.default_version {
                    say(format!(
                        "Latest revision of {} in sources is {}. We already have it merged in {}. Skipping..",
                        t,
                        found.rev.branch_name(),
                        cb
                    ));
                } else {
                    say(format!("We already have this version of {} in {}. Skipping..", t, cb));
                }
            }
        }
    }

    if to_commit.is_empty() {
        return user_error("There is nothing to merge.");
    }
    info!(topics = ?names(&to_commit), "checking dependencies");
    let with_deps = repo.with_dependencies(&to_commit, &own_merges, opts.dependencies)?;
    let plan = repo.with_elder_versions(&with_deps, &own_merges, &source_merges, &ci)?;
    info!(revisions = ?names(&plan), "merging with dependencies and elder versions");

    let fallback_sha = git.current_sha()?;
    let mut report = MergeReport::default();
    for (idx, m) in plan.iter().enumerate() {
        let chosen = chosen_topic.as_ref() == Some(&m.rev.topic);
        let description = match (&opts.description, chosen) {
            (Some(d), true) => Some(d.as_str()),
            _ => m.description.as_deref(),
        };
        let merge_type = match (opts.merge_type, chosen) {
            (Some(t), true) => t,
            _ => m.merge_type,
        };
        let result = match merge_revision(repo, &m.rev, description, merge_type) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, fallback = %fallback_sha, "unexpected merge error, resetting");
                git.reset_hard(&fallback_sha)?;
                return Err(e);
            }
        };
        match result {
            Some(merged) => {
                say(format!("{} merged successfully", m.rev.branch_name()));
                report.merged.push(merged);
            }
            None if protected => {
                git.reset_hard(&fallback_sha)?;
                return Err(FlowError::UnexpectedConflict(format!(
                    "Merge of {} failed. Something went wrong, did not expect conflict there ({}). Please \
                     check carefully what you are doing. Merge aborted, {} reset.",
                    m.rev.branch_name(),
                    cb,
                    cb
                ))
                .into());
            }
            None => {
                say(format!(
                    "Merge of {} failed. See conflicted files via \"git status\", resolve conflicts, add \
                     files to index (\"git add\") and do \"git commit --no-edit\" to finish the merge.",
                    m.rev.branch_name()
                ));
                let conflicted = git.unmerged_files()?;
                if !conflicted.is_empty() {
                    say(format!("Conflicted files: {}", conflicted.join(", ")));
                }
                let remaining = &plan[idx + 1..];
                if !remaining.is_empty() {
                    say(format!(
                        "Then call \"git af merge [topics]\" again to merge remaining topics. Topics \
                         remaining to merge: {}",
                        names(remaining).join(", ")
                    ));
                }
                return user_error("Alternatively, you may abort failed merge via \"git merge --abort\"");
            }
        }
    }
    Ok(report)
}

fn names(merges: &[TopicMerge]) -> Vec<String> {
    merges.iter().map(|m| m.rev.branch_name()).collect()
}
