//! Grouped memoization of `git` read commands for one invocation.
//!
//! Every cached read declares the groups of repository state it depends on.
//! Every mutating command invalidates the groups it can affect, which drops
//! each entry depending on any of them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use tracing::trace;

/// A category of repository state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheGroup {
    /// Branch refs and `HEAD`.
    Branches,
    /// Tag refs.
    Tags,
    /// The commit graph reachable from refs.
    Commits,
    /// Index and working tree.
    Index,
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheGroup::Branches => "branches",
            CacheGroup::Tags => "tags",
            CacheGroup::Commits => "commits",
            CacheGroup::Index => "index",
        };
        f.write_str(name)
    }
}

/// Groups a read of an arbitrary treeish depends on.
pub const REF_READ: &[CacheGroup] = &[CacheGroup::Branches, CacheGroup::Tags, CacheGroup::Commits];

/// Raw result of a git invocation: stdout and exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedOutput {
    pub stdout: String,
    pub exit_code: i32,
}

#[derive(Debug)]
struct Entry {
    groups: Vec<CacheGroup>,
    output: CachedOutput,
}

/// Per-invocation read cache keyed by the git argument vector.
#[derive(Debug, Default)]
pub struct ReadCache {
    entries: RefCell<HashMap<Vec<String>, Entry>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, args: &[String]) -> Option<CachedOutput> {
        self.entries.borrow().get(args).map(|e| e.output.clone())
    }

    pub fn insert(&self, args: Vec<String>, groups: &[CacheGroup], output: CachedOutput) {
        self.entries.borrow_mut().insert(
            args,
            Entry {
                groups: groups.to_vec(),
                output,
            },
        );
    }

    /// Drop every entry depending on any of `groups`.
    pub fn invalidate(&self, groups: &[CacheGroup]) {
        if groups.is_empty() {
            return;
        }
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, e| !e.groups.iter().any(|g| groups.contains(g)));
        trace!(
            groups = ?groups,
            dropped = before - entries.len(),
            "cache invalidated"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
