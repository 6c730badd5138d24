//! Cross-branch consistency of topic revisions.
//!
//! Wherever a revision is merged it must point at the same head, and a newer
//! version of a topic must be built on top of the elder one.

use std::fmt;

use tracing::{info, warn};

use crate::errors::CoreError;
use crate::models::{short_sha, TopicMerge};
use crate::repo::Repo;

/// A merge together with the branch (or treeish) it was found in.
#[derive(Debug, Clone)]
pub struct OriginMerge {
    pub origin: String,
    pub merge: TopicMerge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The same revision was merged with two different heads.
    ShaMismatch {
        revision: String,
        origin_a: String,
        merge_a: String,
        origin_b: String,
        merge_b: String,
    },
    /// A newer version does not descend (first-parent) from an elder one.
    NotBasedOn {
        elder: String,
        elder_origin: String,
        newer: String,
        newer_origin: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ShaMismatch {
                revision,
                origin_a,
                merge_a,
                origin_b,
                merge_b,
            } => write!(
                f,
                "Revision {} is merged in {} (merge {}) and {} (merge {}) with different head SHAs.",
                revision,
                origin_a,
                short_sha(merge_a),
                origin_b,
                short_sha(merge_b)
            ),
            Violation::NotBasedOn {
                elder,
                elder_origin,
                newer,
                newer_origin,
            } => write!(
                f,
                "{} (in {}) is not based on {} (in {}).",
                newer, newer_origin, elder, elder_origin
            ),
        }
    }
}

/// Every violation found; empty when consistent.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub violations: Vec<Violation>,
}

impl ConsistencyReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every pair of non-fake merges of the same topic and iteration.
///
/// `is_based_on(elder, newer)` answers first-parent reachability between
/// revision heads. All pairs are examined before returning.
pub fn evaluate<F>(merges: &[OriginMerge], mut is_based_on: F) -> Result<ConsistencyReport, CoreError>
where
    F: FnMut(&str, &str) -> Result<bool, CoreError>,
{
    let mut report = ConsistencyReport::default();
    let live: Vec<&OriginMerge> = merges.iter().filter(|m| !m.merge.is_fake()).collect();
    for (i, a) in live.iter().enumerate() {
        for b in &live[i + 1..] {
            let (ra, rb) = (&a.merge.rev, &b.merge.rev);
            if ra.topic != rb.topic || ra.iteration != rb.iteration || a.merge.sha == b.merge.sha {
                continue;
            }
            if ra.version == rb.version {
                if ra.sha != rb.sha {
                    report.violations.push(Violation::ShaMismatch {
                        revision: ra.branch_name(),
                        origin_a: a.origin.clone(),
                        merge_a: a.merge.sha.clone(),
                        origin_b: b.origin.clone(),
                        merge_b: b.merge.sha.clone(),
                    });
                }
                continue;
            }
            let (elder, newer) = if ra.version < rb.version { (a, b) } else { (b, a) };
            if !is_based_on(elder.merge.rev_sha(), newer.merge.rev_sha())? {
                report.violations.push(Violation::NotBasedOn {
                    elder: elder.merge.rev.branch_name(),
                    elder_origin: elder.origin.clone(),
                    newer: newer.merge.rev.branch_name(),
                    newer_origin: newer.origin.clone(),
                });
            }
        }
    }
    Ok(report)
}

impl Repo {
    /// Check merges found in all `treeishes` against each other.
    pub fn check_consistency(&self, treeishes: &[&str]) -> Result<ConsistencyReport, CoreError> {
        let mut merges = Vec::new();
        for treeish in treeishes {
            for merge in self.all_merges_in(treeish)? {
                merges.push(OriginMerge {
                    origin: treeish.to_string(),
                    merge,
                });
            }
        }
        let report = evaluate(&merges, |elder, newer| Ok(self.git().is_based_on(elder, newer)?))?;
        for v in &report.violations {
            warn!(violation = %v, "consistency violation");
        }
        info!(treeishes = ?treeishes, violations = report.violations.len(), "consistency checked");
        Ok(report)
    }
}
