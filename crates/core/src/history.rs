//! Recovering topic records and effective merges from commit history.
//!
//! A branch's effective merges are recomputed on every query by replaying
//! the first-parent merge and revert commits between its iteration base
//! point and its head.

use tracing::{debug, instrument, trace};

use crate::errors::{CoreError, ModelError};
use crate::iteration::Iteration;
use crate::message::{topic_merge_grep, ParsedMessage, MERGE_GREP, REVERT_GREP};
use crate::models::{CommitRecord, Topic, TopicMerge, TopicRevert, TopicRevision};
use crate::repo::Repo;

impl Repo {
    // -----------------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------------

    /// `(iteration, topic name, version)` of a branch name. A prefix that is
    /// not an existing iteration stays part of the topic name.
    pub fn parse_branch_name(&self, name: &str) -> Result<Option<(Option<String>, String, Option<u32>)>, CoreError> {
        let parts = match self.parser().split_branch_name(name) {
            Some(parts) => parts,
            None => return Ok(None),
        };
        let parts = match &parts.prefix {
            Some(prefix) if !self.is_iteration(prefix)? => parts.without_iteration(),
            _ => parts,
        };
        Ok(Some((parts.prefix, parts.name, parts.version)))
    }

    pub fn revision_from_branch_name(
        &self,
        name: &str,
        sha: Option<String>,
        default_iteration: Option<&Iteration>,
    ) -> Result<TopicRevision, CoreError> {
        let (iteration, topic, version) = self
            .parse_branch_name(name)?
            .ok_or_else(|| ModelError::InvalidBranchName(name.to_string()))?;
        let iteration = iteration.or_else(|| default_iteration.map(|i| i.name.clone()));
        Ok(TopicRevision::new(Topic::new(topic), sha, version, iteration))
    }

    /// Whether `name` may be used as a topic branch name.
    pub fn is_valid_topic_branch_name(&self, name: &str) -> Result<bool, CoreError> {
        if self.parser().split_branch_name(name).is_none() {
            return Ok(false);
        }
        Ok(self.git().is_valid_ref_name(name)? && !self.is_protected(name)?)
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Classify a commit as a topic merge, a revert of one, or neither.
    pub fn commit_record(&self, treeish: &str) -> Result<CommitRecord, CoreError> {
        let message = self.git().full_message(treeish)?;
        match self.parser().classify(&message) {
            ParsedMessage::Merge(m) => {
                let default_iteration = match &m.target {
                    Some(target) => match target.split_once('/') {
                        Some((prefix, _)) if self.is_iteration(prefix)? => Some(self.iteration(prefix)),
                        _ => None,
                    },
                    None => None,
                };
                let default_iteration = match default_iteration {
                    Some(it) => Some(it),
                    None => self.iteration_by_treeish(treeish)?,
                };
                let rev_sha = self.git().parent(treeish, 2)?;
                let rev = match self.revision_from_branch_name(&m.branch, rev_sha, default_iteration.as_ref()) {
                    Ok(rev) => rev,
                    Err(CoreError::Model(ModelError::InvalidBranchName(name))) => {
                        debug!(treeish, branch = %name, "skipping merge of unparseable branch");
                        return Ok(CommitRecord::Unrecognized);
                    }
                    Err(e) => return Err(e),
                };
                Ok(CommitRecord::Merge(TopicMerge {
                    rev,
                    sha: self.git().rev_parse(treeish)?,
                    description: m.description,
                    merge_type: m.merge_type,
                    target: m.target.unwrap_or_else(|| self.master().to_string()),
                }))
            }
            ParsedMessage::Revert(r) => {
                let iteration = self.iteration_by_treeish(treeish)?;
                let rev = match self.revision_from_branch_name(&r.branch, None, iteration.as_ref()) {
                    Ok(rev) => rev,
                    Err(CoreError::Model(ModelError::InvalidBranchName(_))) => {
                        return Ok(CommitRecord::Unrecognized);
                    }
                    Err(e) => return Err(e),
                };
                Ok(CommitRecord::Revert(TopicRevert {
                    rev,
                    sha: self.git().rev_parse(treeish)?,
                    target: r.target.unwrap_or_else(|| self.master().to_string()),
                    reverted_sha: Some(r.reverted_sha),
                }))
            }
            ParsedMessage::Unrecognized => Ok(CommitRecord::Unrecognized),
        }
    }

    pub fn merge_from_treeish(&self, treeish: &str) -> Result<Option<TopicMerge>, CoreError> {
        match self.commit_record(treeish)? {
            CommitRecord::Merge(m) => Ok(Some(m)),
            _ => Ok(None),
        }
    }

    pub fn revert_from_treeish(&self, treeish: &str) -> Result<Option<TopicRevert>, CoreError> {
        match self.commit_record(treeish)? {
            CommitRecord::Revert(r) => Ok(Some(r)),
            _ => Ok(None),
        }
    }

    /// The merge a revert undid.
    pub fn reverted_merge(&self, revert: &TopicRevert) -> Result<Option<TopicMerge>, CoreError> {
        if let Some(sha) = &revert.reverted_sha {
            return self.merge_from_treeish(sha);
        }
        let merges = self.topic_merges_in(&revert.rev.topic, &revert.sha)?;
        Ok(merges.into_iter().rev().find(|m| m.rev == revert.rev))
    }

    // -----------------------------------------------------------------------
    // Ranges
    // -----------------------------------------------------------------------

    fn base_point_of(&self, treeish: &str) -> Result<String, CoreError> {
        match self.iteration_by_treeish(treeish)? {
            Some(it) => Ok(it.name),
            None => Err(ModelError::UnknownIteration(treeish.to_string()).into()),
        }
    }

    /// Every merge (reverted ones and fakes included) in `BP..treeish`.
    pub fn all_merges_in(&self, treeish: &str) -> Result<Vec<TopicMerge>, CoreError> {
        let base = self.base_point_of(treeish)?;
        let shas = self.git().commits_between(&base, treeish, true, &[MERGE_GREP])?;
        let mut result = Vec::new();
        for sha in shas {
            if let Some(m) = self.merge_from_treeish(&sha)? {
                result.push(m);
            }
        }
        Ok(result)
    }

    /// Merges of one topic in `BP..treeish`, oldest first.
    pub fn topic_merges_in(&self, topic: &Topic, treeish: &str) -> Result<Vec<TopicMerge>, CoreError> {
        let base = self.base_point_of(treeish)?;
        let grep = topic_merge_grep(&topic.name);
        let shas = self.git().commits_between(&base, treeish, true, &[&grep])?;
        let mut result = Vec::new();
        for sha in shas {
            if let Some(m) = self.merge_from_treeish(&sha)? {
                if m.rev.topic == *topic {
                    result.push(m);
                }
            }
        }
        Ok(result)
    }

    /// Merges of one topic into master and every develop and staging.
    pub fn topic_merges_everywhere(&self, topic: &Topic) -> Result<Vec<TopicMerge>, CoreError> {
        let mut heads = Vec::new();
        if self.git().branch_exists(self.master())? {
            heads.push(self.master().to_string());
        }
        for it in self.iterations(false)? {
            heads.push(it.develop);
            heads.push(it.staging);
        }
        if heads.is_empty() {
            return Ok(Vec::new());
        }
        let grep = topic_merge_grep(&topic.name);
        let shas = self.git().find_commits(&heads, &[&grep])?;
        let mut result = Vec::new();
        for sha in shas {
            if let Some(m) = self.merge_from_treeish(&sha)? {
                if m.rev.topic == *topic
                    && (self.is_master(&m.target) || self.is_develop(&m.target)? || self.is_staging(&m.target)?)
                {
                    result.push(m);
                }
            }
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Effective merges
    // -----------------------------------------------------------------------

    /// Live merges in `from..treeish`, `from` defaulting to the base point of
    /// `treeish`'s iteration. Reverted merges are cancelled and fake merges
    /// resolved to their originals. With `recursive`, each merge is preceded
    /// by the effective merges of its own revision, keeping only the newest
    /// version per topic.
    #[instrument(skip(self))]
    pub fn effective_merges(
        &self,
        treeish: &str,
        recursive: bool,
        from: Option<&str>,
    ) -> Result<Vec<TopicMerge>, CoreError> {
        let base = match from {
            Some(f) => f.to_string(),
            None => self.base_point_of(treeish)?,
        };
        let shas = self
            .git()
            .commits_between(&base, treeish, true, &[REVERT_GREP, MERGE_GREP])?;

        let mut result: Vec<TopicMerge> = Vec::new();
        for sha in shas {
            match self.commit_record(&sha)? {
                CommitRecord::Merge(m) => {
                    trace!(merge = %m, "adding");
                    result.push(m);
                }
                CommitRecord::Revert(r) => {
                    if let Some(pos) = result.iter().rposition(|m| m.rev == r.rev) {
                        let removed = result.remove(pos);
                        trace!(merge = %removed, "removing reverted");
                    }
                }
                CommitRecord::Unrecognized => {}
            }
        }

        let mut resolved = Vec::with_capacity(result.len());
        for m in result {
            resolved.push(self.original_merge(&m)?);
        }

        if !recursive {
            return Ok(resolved);
        }
        let mut recursive_result: Vec<TopicMerge> = Vec::new();
        for m in resolved {
            let mut chain = self.own_effective_merges(&m.rev, true)?;
            chain.push(m);
            for candidate in chain {
                if candidate.is_newest_in(&recursive_result) {
                    recursive_result.push(candidate);
                }
            }
        }
        Ok(recursive_result)
    }

    /// Effective merges contained in the history of a revision's head, i.e.
    /// its dependencies.
    pub fn own_effective_merges(&self, rev: &TopicRevision, recursive: bool) -> Result<Vec<TopicMerge>, CoreError> {
        let sha = rev.sha.as_deref().ok_or_else(|| {
            ModelError::IncompleteMergeObject(format!("revision {} has no head SHA", rev))
        })?;
        let base = match self.iteration_by_sha(sha)? {
            Some(it) => it.name,
            None => return Ok(Vec::new()),
        };
        self.effective_merges(sha, recursive, Some(&base))
    }

    /// Resolve a fake merge to its SHA-bearing original.
    ///
    /// The result keeps the fake merge's commit, description, type and
    /// target and takes the revision (with head SHA) from the earliest real
    /// merge of the same topic, iteration and version.
    pub fn original_merge(&self, merge: &TopicMerge) -> Result<TopicMerge, CoreError> {
        if !merge.is_fake() {
            return Ok(merge.clone());
        }
        let iteration = match &merge.rev.iteration {
            Some(name) => Some(name.clone()),
            None => {
                let by_target = if self.is_master(&merge.target) || !self.git().branch_exists(&merge.target)? {
                    None
                } else {
                    self.iteration_by_branch(&merge.target)?
                };
                match by_target {
                    Some(it) => Some(it.name),
                    None => self.iteration_by_sha(&merge.sha)?.map(|it| it.name),
                }
            }
        };
        let iteration = iteration.ok_or_else(|| {
            ModelError::IncompleteMergeObject(format!("unable to find iteration of merge {}", merge))
        })?;

        let grep = topic_merge_grep(&merge.rev.topic.name);
        for sha in self.git().commits_between(&iteration, &merge.sha, true, &[&grep])? {
            if let Some(candidate) = self.merge_from_treeish(&sha)? {
                if candidate.rev == merge.rev && !candidate.is_fake() {
                    debug!(fake = %merge, original = %candidate, "resolved fake merge");
                    return Ok(TopicMerge {
                        rev: candidate.rev,
                        ..merge.clone()
                    });
                }
            }
        }
        Err(ModelError::IncompleteMergeObject(format!("no original merge found for fake merge {}", merge)).into())
    }
}
