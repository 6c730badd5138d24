//! User-level workflows behind `git af <command>`.
//!
//! Every workflow validates everything it can before touching the
//! repository. Refusals are returned as
//! [`FlowError::User`](crate::errors::FlowError::User); progress
//! messages go to stdout through [`say`].

pub mod apply;
pub mod checkout;
pub mod continue_topic;
pub mod finish;
pub mod init;
pub mod list;
pub mod merge;
pub mod rebase;
pub mod revert;
pub mod start;

use tracing::{info, warn};

use crate::errors::{user_error, CoreError, ModelError};
use crate::iteration::Iteration;
use crate::models::{Topic, TopicRevision};
use crate::repo::Repo;

pub use apply::merge_revision;
pub use checkout::checkout;
pub use continue_topic::continue_topic;
pub use finish::{finish, FinishOptions, FinishReport};
pub use init::init;
pub use list::{list, ListOptions, ListRow, ListSection};
pub use merge::{merge, MergeOptions, MergeReport, Selection};
pub use rebase::rebase;
pub use revert::{revert, RevertOptions, RevertReport};
pub use start::start;

/// Print a message for the user and log it.
pub fn say(message: impl AsRef<str>) {
    let message = message.as_ref();
    info!(message, "say to user");
    println!("{}", message);
}

pub(crate) fn check_iteration(repo: &Repo) -> Result<Iteration, CoreError> {
    match repo.current_iteration()? {
        Some(it) => Ok(it),
        None => user_error(
            "Cannot determine current iteration. Make sure you are in a git-aflow repository \
             and HEAD is based on an iteration start.",
        ),
    }
}

pub(crate) fn check_current_branch(repo: &Repo) -> Result<String, CoreError> {
    match repo.git().current_branch()? {
        Some(b) => Ok(b),
        None => user_error("Cannot proceed in detached HEAD state. Please check out a branch first."),
    }
}

pub(crate) fn check_working_tree_clean(repo: &Repo) -> Result<(), CoreError> {
    if repo.git().is_working_tree_clean()? {
        Ok(())
    } else {
        user_error(
            "Working tree is not clean. Please commit or stash your changes before proceeding.",
        )
    }
}

/// Refuse when an untracked file would be overwritten by checking out
/// `treeish`.
pub(crate) fn check_untracked_not_differ(repo: &Repo, treeish: &str) -> Result<(), CoreError> {
    let mut clashing = Vec::new();
    for file in repo.git().untracked_files()? {
        if repo.git().has_path(treeish, &file)? {
            clashing.push(file);
        }
    }
    if clashing.is_empty() {
        return Ok(());
    }
    user_error(format!(
        "Untracked files would be overwritten by {}: {}. Please move or remove them before \
         proceeding.",
        treeish,
        clashing.join(", ")
    ))
}

/// Revision named by `name`; unparseable names are refused.
pub(crate) fn parse_revision(
    repo: &Repo,
    name: &str,
    sha: Option<String>,
    default_iteration: Option<&Iteration>,
) -> Result<TopicRevision, CoreError> {
    match repo.revision_from_branch_name(name, sha, default_iteration) {
        Err(CoreError::Model(ModelError::InvalidBranchName(n))) => user_error(format!("Invalid topic name {}.", n)),
        other => other,
    }
}

/// Local branches of `topic` in any iteration.
pub(crate) fn topic_branches(repo: &Repo, topic: &Topic) -> Result<Vec<String>, CoreError> {
    let pattern = format!("*{}*", topic.name);
    let mut result = Vec::new();
    for b in repo.git().list_branches(&[&pattern])? {
        if let Some((_, name, _)) = repo.parse_branch_name(&b)? {
            if name == topic.name {
                result.push(b);
            }
        }
    }
    Ok(result)
}

pub(crate) fn check_topic_name_valid(repo: &Repo, name: &str) -> Result<(), CoreError> {
    if repo.is_valid_topic_branch_name(name)? {
        Ok(())
    } else {
        user_error(format!("Invalid topic name {}.", name))
    }
}

/// Sources used when none are given: staging on master, master and staging
/// on a release branch, develop anywhere else.
pub fn default_sources(repo: &Repo) -> Result<Vec<String>, CoreError> {
    let branches = repo.branches();
    let current = repo.git().current_branch()?;
    let sources = match current.as_deref() {
        Some(b) if repo.is_master(b) => vec![branches.staging.clone()],
        Some(b) if repo.is_release(b) => vec![branches.master.clone(), branches.staging.clone()],
        _ => vec![branches.develop.clone()],
    };
    Ok(sources)
}

/// Print every consistency violation among `treeishes` and refuse when
/// there was any.
pub(crate) fn ensure_consistent(repo: &Repo, treeishes: &[&str]) -> Result<(), CoreError> {
    let report = repo.check_consistency(treeishes)?;
    if report.is_ok() {
        return Ok(());
    }
    for v in &report.violations {
        say(v.to_string());
    }
    warn!(violations = report.violations.len(), "consistency check failed");
    user_error("Please, fix aforementioned problems and rerun the command.")
}

