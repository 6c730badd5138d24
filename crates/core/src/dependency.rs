//! Dependency closure of topic revisions.
//!
//! A revision's own effective merges (recursive) are the revisions its head
//! already contains, i.e. everything it depends on.

use tracing::{debug, info};

use crate::errors::{CoreError, FlowError};
use crate::iteration::Iteration;
use crate::models::{TopicMerge, TopicRevision};
use crate::repo::Repo;

impl Repo {
    /// Dependencies of `rev` (other topics only) absent from `present`.
    pub fn missing_dependencies(
        &self,
        rev: &TopicRevision,
        present: &[TopicRevision],
    ) -> Result<Vec<TopicMerge>, CoreError> {
        let mut missing = Vec::new();
        for dep in self.own_effective_merges(rev, true)? {
            if dep.rev.topic != rev.topic && dep.rev.is_newest_in(present) {
                missing.push(dep);
            }
        }
        Ok(missing)
    }

    /// Put every missing dependency ahead of the candidate requiring it.
    ///
    /// Without `include_dependencies` the first dependency on another topic
    /// that is absent from `own` fails the whole operation. Elder versions of
    /// the candidate's own topic are left to [`Repo::with_elder_versions`].
    pub fn with_dependencies(
        &self,
        candidates: &[TopicMerge],
        own: &[TopicMerge],
        include_dependencies: bool,
    ) -> Result<Vec<TopicMerge>, CoreError> {
        let mut result: Vec<TopicMerge> = Vec::new();
        for m in candidates {
            debug!(revision = %m.rev, "dependency search");
            for dep in self.own_effective_merges(&m.rev, true)? {
                if !dep.is_newest_in(own.iter().chain(result.iter())) {
                    continue;
                }
                if include_dependencies {
                    info!(dependency = %dep.rev, required_by = %m.rev, "adding dependency");
                    result.push(dep);
                } else if dep.rev.topic != m.rev.topic {
                    return Err(FlowError::MissingDependency {
                        revision: m.rev.branch_name(),
                        dependency: dep.rev.branch_name(),
                    }
                    .into());
                }
            }
            if !m.rev.is_in_merges(&result) {
                result.push(m.clone());
            }
        }
        Ok(result)
    }

    /// Insert elder versions of each merged revision, taken from `sources`,
    /// that the destination does not have yet.
    pub fn with_elder_versions(
        &self,
        merges: &[TopicMerge],
        own: &[TopicMerge],
        sources: &[TopicMerge],
        iteration: &Iteration,
    ) -> Result<Vec<TopicMerge>, CoreError> {
        let own_revisions: Vec<TopicRevision> = own.iter().map(|m| m.rev.clone()).collect();
        let mut result: Vec<TopicMerge> = Vec::new();
        for m in merges {
            for v in 1..m.rev.version {
                let elder = TopicRevision::new(m.rev.topic.clone(), None, Some(v), Some(iteration.name.clone()));
                if elder.is_in_merges(result.iter().chain(own.iter())) {
                    continue;
                }
                match sources.iter().find(|s| s.rev == elder) {
                    Some(sm) => result.push(sm.clone()),
                    None if elder.is_newest_in(&own_revisions) => {
                        return Err(FlowError::MissingElderVersion {
                            revision: m.rev.branch_name(),
                            elder: elder.branch_name(),
                        }
                        .into());
                    }
                    None => {}
                }
            }
            if !m.rev.is_in_merges(&result) {
                result.push(m.clone());
            }
        }
        Ok(result)
    }
}
