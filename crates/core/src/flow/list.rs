//! `git af list`: newest effective merge per topic in each source.

use tracing::instrument;

use crate::errors::{user_error, CoreError};
use crate::models::MergeType;
use crate::repo::Repo;

use super::{check_iteration, default_sources};

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub sources: Vec<String>,
    /// List master, staging and develop of the current iteration.
    pub all: bool,
    /// Merge types to show; empty shows every type.
    pub filters: Vec<MergeType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub topic: String,
    pub merge_type: MergeType,
    pub version: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListSection {
    pub source: String,
    pub rows: Vec<ListRow>,
}

#[instrument(skip(repo))]
pub fn list(repo: &Repo, opts: &ListOptions) -> Result<Vec<ListSection>, CoreError> {
    if opts.all && !opts.sources.is_empty() {
        return user_error(
            "Cannot process -a/--all together with sources list. You may choose to list topics from all \
             branches (master, develop and staging) OR specify sources manually",
        );
    }
    let sources = if opts.all {
        let b = repo.branches();
        vec![b.master.clone(), b.staging.clone(), b.develop.clone()]
    } else if opts.sources.is_empty() {
        default_sources(repo)?
    } else {
        opts.sources.clone()
    };
    let ci = check_iteration(repo)?;

    let mut sections = Vec::new();
    for s in sources {
        let source = repo.complete_branch_name(&s, &ci.name);
        if repo.git().try_rev_parse(&source)?.is_none() {
            return user_error(format!("Unknown source {}.", source));
        }
        let mut rows: Vec<ListRow> = Vec::new();
        for m in repo.effective_merges(&source, false, None)?.into_iter().rev() {
            if rows.iter().any(|r| r.topic == m.rev.topic.name) {
                continue;
            }
            if !opts.filters.is_empty() && !opts.filters.contains(&m.merge_type) {
                continue;
            }
            rows.push(ListRow {
                topic: m.rev.topic.name,
                merge_type: m.merge_type,
                version: m.rev.version,
                description: m.description,
            });
        }
        sections.push(ListSection { source, rows });
    }
    Ok(sections)
}
