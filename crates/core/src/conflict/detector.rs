//! Conflict prediction between topic heads.
//!
//! Heads are grouped by merge base, and within each group every pair of
//! heads is compared file by file: two heads conflict when a hunk of one
//! touches lines that a hunk of the other touches, both relative to the
//! group's base. Nothing is merged and the working tree is never touched.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use regex_lite::Regex;
use tracing::{debug, info};

use crate::errors::{CoreError, GitError, ModelError};
use crate::git::GitCli;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Read-only history queries the detector needs.
pub trait ChangeReader {
    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError>;

    /// Paths (relative to the top level) that differ between two commits.
    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>, GitError>;

    /// Zero-context unified diff of one file.
    fn file_diff(&self, base: &str, head: &str, file: &str) -> Result<String, GitError>;

    fn root(&self) -> PathBuf;
}

impl ChangeReader for GitCli {
    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError> {
        GitCli::merge_base(self, &[a, b])
    }

    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>, GitError> {
        self.list_files_differ(base, head)
    }

    fn file_diff(&self, base: &str, head: &str, file: &str) -> Result<String, GitError> {
        self.diff(base, head, &[file])
    }

    fn root(&self) -> PathBuf {
        GitCli::root(self).to_path_buf()
    }
}

/// First overlapping change found between two heads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub first: String,
    pub second: String,
    /// Absolute path of the file.
    pub file: PathBuf,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} and {} in file {}", self.first, self.second, self.file.display())
    }
}

/// Lines `[start, end)` touched by one hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub start: u64,
    pub end: u64,
}

impl Scope {
    pub fn overlaps(&self, other: &Scope) -> bool {
        !(self.end < other.start || self.start > other.end)
    }
}

/// Heads sharing one merge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadGroup {
    pub base: String,
    pub heads: Vec<String>,
}

// ---------------------------------------------------------------------------
// Hunk parsing
// ---------------------------------------------------------------------------

const HUNK_HEADER: &str = r"(?m)^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@";

/// Scope of each hunk header in a unified diff, in old-file coordinates.
///
/// A hunk removing nothing occupies the single line at its insertion point.
pub fn parse_scopes(re: &Regex, diff: &str) -> Vec<Scope> {
    let mut scopes = Vec::new();
    for caps in re.captures_iter(diff) {
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        let start = match number(1) {
            Some(s) => s,
            None => continue,
        };
        let len = number(2).unwrap_or(1);
        let scope = if len == 0 {
            Scope { start, end: start + 1 }
        } else {
            Scope { start, end: start + len }
        };
        scopes.push(scope);
    }
    scopes
}

fn scopes_overlap(a: &[Scope], b: &[Scope]) -> bool {
    a.iter().any(|sa| b.iter().any(|sb| sa.overlaps(sb)))
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct ConflictDetector<'a, R: ChangeReader + ?Sized> {
    reader: &'a R,
    hunk_re: Regex,
}

/// Per-head changed files with lazily parsed scopes, for one base.
type Changes = HashMap<String, Vec<(String, Option<Vec<Scope>>)>>;

impl<'a, R: ChangeReader + ?Sized> ConflictDetector<'a, R> {
    pub fn new(reader: &'a R) -> Result<Self, CoreError> {
        let hunk_re = Regex::new(HUNK_HEADER).map_err(ModelError::from)?;
        Ok(Self { reader, hunk_re })
    }

    /// Group heads by pairwise merge base.
    ///
    /// A pair joins an existing group of its base only when every member of
    /// the group shares that same base with both heads of the pair.
    pub fn group(&self, heads: &[String]) -> Result<Vec<HeadGroup>, CoreError> {
        let mut unique: Vec<&str> = Vec::new();
        for h in heads {
            if !unique.contains(&h.as_str()) {
                unique.push(h);
            }
        }

        let mut bases: Vec<((usize, usize), String)> = Vec::new();
        for i in 0..unique.len() {
            for j in i + 1..unique.len() {
                let base = self.reader.merge_base(unique[i], unique[j])?.ok_or_else(|| GitError::CommandFailed {
                    command: format!("merge-base {} {}", unique[i], unique[j]),
                    exit_code: 1,
                    stderr: "no common ancestor".into(),
                })?;
                bases.push(((i, j), base));
            }
        }
        debug!(pairs = bases.len(), "merge bases computed");
        let base_of = |a: usize, b: usize| -> Option<&str> {
            let key = if a < b { (a, b) } else { (b, a) };
            bases.iter().find(|(k, _)| *k == key).map(|(_, s)| s.as_str())
        };

        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for ((i, j), base) in &bases {
            let joined = groups.iter_mut().filter(|(b, _)| b == base).find(|(_, members)| {
                members.iter().all(|&m| {
                    [*i, *j]
                        .iter()
                        .all(|&h| h == m || base_of(h, m) == Some(base.as_str()))
                })
            });
            match joined {
                Some((_, members)) => {
                    for h in [*i, *j] {
                        if !members.contains(&h) {
                            members.push(h);
                        }
                    }
                }
                None => groups.push((base.clone(), vec![*i, *j])),
            }
        }

        // groups sharing a base are kept adjacent, in order of first appearance
        let mut ordered: Vec<HeadGroup> = Vec::new();
        let mut seen_bases: Vec<&str> = Vec::new();
        for (base, _) in &groups {
            if seen_bases.contains(&base.as_str()) {
                continue;
            }
            seen_bases.push(base);
            for (b, members) in groups.iter().filter(|(b, _)| b == base) {
                ordered.push(HeadGroup {
                    base: b.clone(),
                    heads: members.iter().map(|&m| unique[m].to_string()).collect(),
                });
            }
        }
        Ok(ordered)
    }

    /// First conflict between any two of `heads`, or `None`.
    pub fn first_conflict(&self, heads: &[String]) -> Result<Option<Conflict>, CoreError> {
        let groups = self.group(heads)?;
        let mut per_base: HashMap<String, Changes> = HashMap::new();
        for group in &groups {
            info!(base = %group.base, heads = ?group.heads, "checking group");
            let changes = per_base.entry(group.base.clone()).or_default();
            for (i, first) in group.heads.iter().enumerate() {
                for second in &group.heads[i + 1..] {
                    if let Some(file) = self.pair_conflict(&group.base, first, second, changes)? {
                        info!(first = %first, second = %second, file = %file, "conflict found");
                        return Ok(Some(Conflict {
                            first: first.clone(),
                            second: second.clone(),
                            file: self.reader.root().join(file),
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    fn pair_conflict(&self, base: &str, a: &str, b: &str, changes: &mut Changes) -> Result<Option<String>, CoreError> {
        for head in [a, b] {
            if !changes.contains_key(head) {
                let files = self.reader.changed_files(base, head)?;
                debug!(head, base, files = files.len(), "changed files read");
                changes.insert(head.to_string(), files.into_iter().map(|f| (f, None)).collect());
            }
        }
        let common: Vec<String> = match (changes.get(a), changes.get(b)) {
            (Some(fa), Some(fb)) => fa
                .iter()
                .filter(|(f, _)| fb.iter().any(|(g, _)| g == f))
                .map(|(f, _)| f.clone())
                .collect(),
            _ => Vec::new(),
        };
        for file in common {
            let sa = self.scopes(base, a, &file, changes)?;
            let sb = self.scopes(base, b, &file, changes)?;
            if scopes_overlap(&sa, &sb) {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    fn scopes(&self, base: &str, head: &str, file: &str, changes: &mut Changes) -> Result<Vec<Scope>, CoreError> {
        let entry = changes
            .get_mut(head)
            .and_then(|files| files.iter_mut().find(|(f, _)| f == file));
        match entry {
            Some((_, Some(scopes))) => Ok(scopes.clone()),
            Some((_, slot)) => {
                let scopes = parse_scopes(&self.hunk_re, &self.reader.file_diff(base, head, file)?);
                debug!(head, file, scopes = ?scopes, "hunks parsed");
                *slot = Some(scopes.clone());
                Ok(scopes)
            }
            None => Ok(Vec::new()),
        }
    }
}
