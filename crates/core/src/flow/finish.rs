//! `git af finish`: merge the current topic into develop.

use tracing::{error, info, instrument};

use crate::conflict::ConflictDetector;
use crate::errors::{user_error, CoreError, FlowError};
use crate::models::{MergeType, TopicMerge, TopicRevision};
use crate::repo::Repo;

use super::apply::merge_revision;
use super::{
    check_iteration, check_topic_name_valid, check_untracked_not_differ, check_working_tree_clean,
    ensure_consistent, parse_revision, say,
};

#[derive(Debug, Clone, Default)]
pub struct FinishOptions {
    /// Topic name; defaults to the current branch.
    pub name: Option<String>,
    pub description: Option<String>,
    pub merge_type: Option<MergeType>,
}

#[derive(Debug, Clone)]
pub struct FinishReport {
    pub merge: TopicMerge,
    pub deleted_branch: Option<String>,
}

#[instrument(skip(repo))]
pub fn finish(repo: &Repo, opts: &FinishOptions) -> Result<FinishReport, CoreError> {
    let git = repo.git();
    let ci = check_iteration(repo)?;
    let cd = ci.develop.clone();
    let cb = git.current_branch()?;

    if let Some(b) = &cb {
        if repo.is_protected(b)? {
            let names = repo.branches();
            return user_error(format!(
                "Finish failed for branch {}. Cannot finish {}, {}, {} or {}/* branches.",
                b, names.develop, names.master, names.staging, names.release
            ));
        }
    }

    // A detached head may be finished too, e.g. to re-finish a reverted
    // revision after "git af checkout".
    let head = git.current_sha()?;
    let all_m_cd = repo.all_merges_in(&cd)?;
    let name = match (&opts.name, &cb) {
        (Some(n), _) => n.clone(),
        (None, Some(b)) => b.clone(),
        (None, None) => match all_m_cd.iter().rev().find(|m| m.rev.sha.as_deref() == Some(head.as_str())) {
            Some(m) => {
                let n = m.rev.branch_name();
                say(format!("Assuming topic you are finishing is {}.", n));
                n
            }
            None => {
                return user_error(
                    "You are in detached head state now. Please check out topic you want to finish, \
                     e.g. \"git af checkout topicA\" or specify name (like git af finish -n TopicName \
                     if you are going to merge a commit, not branch).",
                )
            }
        },
    };

    let mut cr = parse_revision(repo, &name, Some(head.clone()), Some(&ci))?;
    if cr.iteration.as_deref() != Some(ci.name.as_str()) {
        return user_error("It is not possible to finish in current iteration topic from other one. Finish failed.");
    }

    let everywhere = repo.topic_merges_everywhere(&cr.topic)?;
    if let Some(last) = cr.topic.latest_merge(&everywhere, false) {
        if last.rev.version + 1 < cr.version {
            return user_error(format!(
                "Wrong topic version specified. Latest revision has version == {}. Increment version by 1",
                last.rev.version
            ));
        }
    }

    if cr.default_version {
        if let Some(m) = all_m_cd
            .iter()
            .find(|m| m.rev.topic == cr.topic && m.rev.sha.as_deref() == Some(head.as_str()))
        {
            cr = TopicRevision::new(cr.topic.clone(), cr.sha.clone(), Some(m.rev.version), cr.iteration.clone());
            say(format!(
                "Using version {} of already merged revision with same head SHA.",
                cr.version
            ));
        } else if let Some(last) = cr.topic.latest_merge(&all_m_cd, true) {
            if git.is_based_on(last.rev_sha(), &head)? {
                cr = TopicRevision::new(cr.topic.clone(), cr.sha.clone(), Some(last.rev.version + 1), cr.iteration.clone());
                say(format!("Using topic version {} as default.", cr.version));
            }
        }
    } else if cr.version > 1 {
        let last_version = if all_m_cd.is_empty() {
            let first = repo.first_iteration()?.map(|it| it.name);
            let eff_master = match first {
                Some(first) if first != ci.name => repo.effective_merges(&ci.name, false, Some(&first))?,
                _ => Vec::new(),
            };
            cr.topic.latest_merge(&eff_master, false).map(|m| m.rev.version)
        } else {
            cr.topic.latest_merge(&all_m_cd, false).map(|m| m.rev.version)
        };
        if last_version.map_or(true, |v| cr.version > v + 1) {
            return user_error(format!(
                "You should finish version {} before finishing {}",
                cr.version - 1,
                cr.branch_name()
            ));
        }
    }
    check_topic_name_valid(repo, &cr.branch_name())?;

    info!(revision = %cr, "topic name is valid, checking working tree");
    check_working_tree_clean(repo)?;
    check_untracked_not_differ(repo, &cd)?;

    let eff_m_cd = repo.effective_merges(&cd, false, None)?;
    if let Some(last) = cr.topic.latest_merge(&eff_m_cd, false) {
        let last_sha = last.rev_sha();
        if last_sha == head || (!last_sha.is_empty() && git.is_based_on(&head, last_sha)?) {
            return user_error(format!("{} already contains this revision of {}", cd, cr.topic));
        }
    }

    info!("checking topic base");
    if head == git.rev_parse(&ci.name)? {
        return user_error("Finish failed. Topic must contain at least one commit.");
    }
    if !git.is_based_on(&ci.name, &head)? {
        return user_error(
            "Finish failed. Current topic branch is not based on iteration start which is not \
             allowed in git-aflow",
        );
    }
    let later: Vec<_> = repo
        .iterations(true)?
        .into_iter()
        .skip_while(|it| *it != ci)
        .skip(1)
        .collect();
    for it in later {
        if git.rev_parse(&it.name)? == head || git.is_based_on(&it.name, &head)? {
            return user_error(format!(
                "Current topic branch is based on {}. Start the topic in that iteration or base it on {} \
                 and then call \"git af finish\"",
                it, ci
            ));
        }
    }

    // Revisions of this topic must line up by version and no topic may be
    // built on top of another one.
    for m in all_m_cd.iter().filter(|m| !m.is_fake()) {
        let m_sha = m.rev_sha();
        if m.rev.topic == cr.topic {
            if m.rev.version < cr.version && !git.is_based_on(m_sha, &head)? {
                return user_error(format!(
                    "Cannot finish. There is elder revision of this topic in {} and SHA you are trying to \
                     finish is not based on it. Please rebase your work on {}",
                    cd,
                    m.rev.branch_name()
                ));
            } else if m.rev.version > cr.version && !git.is_based_on(&head, m_sha)? {
                return user_error(format!(
                    "Cannot finish. Newer revision {} was merged into {} and it is not based on revision \
                     you are trying to finish.",
                    m.rev.branch_name(),
                    cd
                ));
            } else if m.rev == cr && m_sha != head {
                return user_error(format!(
                    "{} was already merged in {} with different head SHA. Finish failed.",
                    cr.branch_name(),
                    cd
                ));
            }
        } else if git.is_based_on(m_sha, &head)? {
            return user_error(
                "TB of current topic is based on another topic, which is illegal. You should either merge \
                 other topic instead of basing on it or name topic you are finishing appropriately.",
            );
        } else if git.is_based_on(&head, m_sha)? {
            return user_error(format!(
                "Finish failed. There is another topic ({}) in {} which is based on one you are trying to \
                 finish.",
                m.rev.branch_name(),
                cd
            ));
        }
    }

    info!(revision = %cr, "topic base is correct, checking dependencies");
    let revs_cd: Vec<TopicRevision> = eff_m_cd.iter().map(|m| m.rev.clone()).collect();
    if let Some(dep) = repo.missing_dependencies(&cr, &revs_cd)?.first() {
        return user_error(format!(
            "Finish failed. Your topic depends on {} which is absent in {}",
            dep.rev.branch_name(),
            cd
        ));
    }

    info!("dependencies are OK, checking consistency");
    let own_ref = cb.clone().unwrap_or_else(|| head.clone());
    ensure_consistent(repo, &[cd.as_str(), own_ref.as_str()])?;

    info!("consistency OK, checking for conflicts");
    let mut heads = vec![head.clone()];
    heads.extend(revs_cd.iter().filter_map(|r| r.sha.clone()));
    let detector = ConflictDetector::new(git)?;
    if let Some(conflict) = detector.first_conflict(&heads)? {
        let mut names: Vec<String> = [&conflict.first, &conflict.second]
            .iter()
            .filter_map(|s| revs_cd.iter().find(|r| r.sha.as_deref() == Some(s.as_str())))
            .map(|r| r.branch_name())
            .collect();
        if names.len() < 2 {
            names.push(cr.branch_name());
        }
        return Err(FlowError::Conflict {
            first: names[0].clone(),
            second: names[1].clone(),
            file: conflict.file.display().to_string(),
        }
        .into());
    }

    info!(develop = %cd, "no conflicts found, merging");
    git.checkout(&cd)?;
    let fallback_sha = git.current_sha()?;
    let merge_type = opts.merge_type.unwrap_or_default();
    let merge = match merge_revision(repo, &cr, opts.description.as_deref(), merge_type) {
        Ok(Some(m)) => m,
        Ok(None) => {
            git.reset_hard(&fallback_sha)?;
            return Err(FlowError::UnexpectedConflict(format!(
                "Merge of {} conflicted unexpectedly. Conflict detector gave false negative result. {} reset.",
                cr.branch_name(),
                cd
            ))
            .into());
        }
        Err(e) => {
            error!(error = %e, fallback = %fallback_sha, "unexpected merge failure, resetting develop");
            git.reset_hard(&fallback_sha)?;
            return Err(e);
        }
    };
    say(format!("{} merged into {} successfully.", cr.branch_name(), cd));

    let mut deleted_branch = None;
    if let Some(b) = cb {
        git.delete_branch(&b)?;
        say(format!("Branch {} deleted.", b));
        deleted_branch = Some(b);
    }
    Ok(FinishReport { merge, deleted_branch })
}
