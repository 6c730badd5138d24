//! Domain model types: topics, revisions, merges and reverts.
//!
//! None of these records are stored anywhere. They are derived from commit
//! messages and ancestry on every query.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Merge type
// ---------------------------------------------------------------------------

/// Kind of change a topic brings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeType {
    /// Bug fix.
    Fix,
    /// Internal development (refactoring, tooling).
    Dev,
    /// End-user feature.
    #[default]
    Euf,
}

impl MergeType {
    pub const ALL: [MergeType; 3] = [MergeType::Fix, MergeType::Dev, MergeType::Euf];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fix => "FIX",
            Self::Dev => "DEV",
            Self::Euf => "EUF",
        }
    }
}

impl fmt::Display for MergeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIX" => Ok(Self::Fix),
            "DEV" => Ok(Self::Dev),
            "EUF" => Ok(Self::Euf),
            other => Err(format!("unknown merge type '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// A named unit of work. Equal by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Highest-version merge of this topic in `merges`.
    pub fn latest_merge<'a, I>(&self, merges: I, no_fake: bool) -> Option<&'a TopicMerge>
    where
        I: IntoIterator<Item = &'a TopicMerge>,
    {
        let mut last: Option<&TopicMerge> = None;
        for m in merges {
            if m.rev.topic != *self || (no_fake && m.is_fake()) {
                continue;
            }
            if last.map_or(true, |l| l.rev.version < m.rev.version) {
                last = Some(m);
            }
        }
        last
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// TopicRevision
// ---------------------------------------------------------------------------

/// A specific version of a topic within an iteration.
///
/// Equality and hashing ignore `sha` and `default_version`: a revision
/// named before its first merge equals the merged one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRevision {
    pub topic: Topic,
    /// Head of the topic branch, unknown for fake merges and bare names.
    pub sha: Option<String>,
    pub version: u32,
    pub iteration: Option<String>,
    /// No explicit `_vN` suffix was given.
    pub default_version: bool,
}

impl TopicRevision {
    /// `version: None` means version 1 with the default marker set.
    pub fn new(topic: Topic, sha: Option<String>, version: Option<u32>, iteration: Option<String>) -> Self {
        Self {
            topic,
            sha,
            version: version.unwrap_or(1),
            iteration,
            default_version: version.is_none(),
        }
    }

    /// `iteration/topic_vN`.
    pub fn branch_name(&self) -> String {
        match &self.iteration {
            Some(it) => format!("{}/{}_v{}", it, self.topic.name, self.version),
            None => format!("{}_v{}", self.topic.name, self.version),
        }
    }

    /// False if any entry has the same topic and a version at least as new.
    pub fn is_newest_in<'a, I>(&self, revisions: I) -> bool
    where
        I: IntoIterator<Item = &'a TopicRevision>,
    {
        !revisions
            .into_iter()
            .any(|r| r.topic == self.topic && r.version >= self.version)
    }

    pub fn is_in_merges<'a, I>(&self, merges: I) -> bool
    where
        I: IntoIterator<Item = &'a TopicMerge>,
    {
        merges.into_iter().any(|m| m.rev == *self)
    }

    pub fn is_in_reverts<'a, I>(&self, reverts: I) -> bool
    where
        I: IntoIterator<Item = &'a TopicRevert>,
    {
        reverts.into_iter().any(|r| r.rev == *self)
    }
}

impl PartialEq for TopicRevision {
    fn eq(&self, other: &Self) -> bool {
        self.iteration == other.iteration && self.topic == other.topic && self.version == other.version
    }
}

impl Eq for TopicRevision {}

impl Hash for TopicRevision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.iteration.hash(state);
        self.topic.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for TopicRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(it) = &self.iteration {
            write!(f, "{}/", it)?;
        }
        write!(f, "{}", self.topic)?;
        if self.default_version {
            write!(f, "(_v{})", self.version)?;
        } else {
            write!(f, "_v{}", self.version)?;
        }
        if let Some(sha) = &self.sha {
            write!(f, "[{}]", short_sha(sha))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TopicMerge
// ---------------------------------------------------------------------------

/// `rev` was merged into `target` by commit `sha`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMerge {
    pub rev: TopicRevision,
    pub sha: String,
    pub description: Option<String>,
    pub merge_type: MergeType,
    pub target: String,
}

impl TopicMerge {
    /// A fake merge re-applied a reverted revision without a second parent,
    /// so its revision SHA is unknown until resolved against the original.
    pub fn is_fake(&self) -> bool {
        self.rev.sha.is_none()
    }

    /// False if any entry has the same topic and a version at least as new.
    pub fn is_newest_in<'a, I>(&self, merges: I) -> bool
    where
        I: IntoIterator<Item = &'a TopicMerge>,
    {
        !merges
            .into_iter()
            .any(|m| m.rev.topic == self.rev.topic && m.rev.version >= self.rev.version)
    }

    /// Head SHA of the merged revision; empty for unresolved fakes.
    pub fn rev_sha(&self) -> &str {
        self.rev.sha.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for TopicMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Merge[{}] of {} into {} {}",
            short_sha(&self.sha),
            self.rev,
            self.target,
            self.merge_type
        )?;
        if let Some(d) = &self.description {
            write!(f, " {}", d)?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// TopicRevert
// ---------------------------------------------------------------------------

/// Revert of the merge of `rev` into `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRevert {
    pub rev: TopicRevision,
    pub sha: String,
    pub target: String,
    pub reverted_sha: Option<String>,
}

impl fmt::Display for TopicRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Revert[{}] of merge of {} into {}", short_sha(&self.sha), self.rev, self.target)?;
        if let Some(r) = &self.reverted_sha {
            write!(f, ". Reverted SHA: {}", r)?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Commit classification
// ---------------------------------------------------------------------------

/// What a commit on an integration branch means to the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRecord {
    Merge(TopicMerge),
    Revert(TopicRevert),
    Unrecognized,
}

pub fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(7)]
}
