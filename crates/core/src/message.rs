//! Commit message wire format for topic merges and reverts.
//!
//! ```text
//! Merge branch '<iteration>/<topic>_v<version>'[ into <target>]
//!
//! FIX|DEV|EUF
//! <free-text description>
//! ```
//!
//! The `into` clause is omitted when the target is the master branch.
//! Reverts use git's own `Revert "<headline>"` / `This reverts commit <sha>.`
//! convention.

use std::fmt;

use regex_lite::Regex;
use tracing::{debug, warn};

use crate::models::MergeType;

/// Extended regexps for `git rev-list --grep`.
pub const MERGE_GREP: &str = "^Merge branch .*$";
pub const REVERT_GREP: &str = "^Revert \"Merge branch .*\"$";

/// Parsed merge commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeMessage {
    /// Merged branch, e.g. `1/topic_v2`.
    pub branch: String,
    /// Target branch; `None` for master.
    pub target: Option<String>,
    pub merge_type: MergeType,
    pub description: Option<String>,
}

impl fmt::Display for MergeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Merge branch '{}'", self.branch)?;
        if let Some(target) = &self.target {
            write!(f, " into {}", target)?;
        }
        write!(f, "\n\n{}", self.merge_type)?;
        if let Some(d) = &self.description {
            write!(f, "\n{}", d)?;
        }
        Ok(())
    }
}

/// Parsed revert commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertMessage {
    /// Branch whose merge was reverted.
    pub branch: String,
    pub target: Option<String>,
    /// SHA named in the `This reverts commit` trailer.
    pub reverted_sha: String,
}

/// A commit message classified by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    Merge(MergeMessage),
    Revert(RevertMessage),
    Unrecognized,
}

/// Raw split of a topic branch name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNameParts {
    /// Text before the first `/`, if any. Not yet checked to be an iteration.
    pub prefix: Option<String>,
    pub name: String,
    pub version: Option<u32>,
}

impl BranchNameParts {
    /// Fold the prefix into the topic name (topic names may contain `/`).
    pub fn without_iteration(self) -> Self {
        match self.prefix {
            Some(prefix) => Self {
                prefix: None,
                name: format!("{}/{}", prefix, self.name),
                version: self.version,
            },
            None => self,
        }
    }
}

/// Compiled patterns for the message wire format.
#[derive(Debug, Clone)]
pub struct MessageParser {
    branch_name: Regex,
    merge_headline: Regex,
    revert_message: Regex,
}

impl MessageParser {
    pub fn new() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            branch_name: Regex::new(r"^(?:([^/]+)/)?(.+?)(?:_v(\d+))?$")?,
            merge_headline: Regex::new(r"^Merge branch '(.*)'(?: into (.+))?$")?,
            revert_message: Regex::new(r#"(?s)^Revert "(.*?)"[\r\n]+This reverts commit ([0-9a-fA-F]+)[.,]"#)?,
        })
    }

    /// Split `[prefix/]name[_vN]`. `None` when the name cannot describe a
    /// topic revision, including non-positive or overflowing versions.
    pub fn split_branch_name(&self, branch_name: &str) -> Option<BranchNameParts> {
        let caps = self.branch_name.captures(branch_name)?;
        let version = match caps.get(3) {
            Some(v) => match v.as_str().parse::<u32>() {
                Ok(0) | Err(_) => {
                    debug!(branch_name, "rejecting branch name with invalid version");
                    return None;
                }
                Ok(n) => Some(n),
            },
            None => None,
        };
        Some(BranchNameParts {
            prefix: caps.get(1).map(|m| m.as_str().to_string()),
            name: caps.get(2)?.as_str().to_string(),
            version,
        })
    }

    /// `Merge branch '<branch>'[ into <target>]` to `(branch, target)`.
    pub fn parse_merge_headline(&self, headline: &str) -> Option<(String, Option<String>)> {
        let caps = self.merge_headline.captures(headline)?;
        let branch = caps.get(1)?.as_str().to_string();
        let target = caps.get(2).map(|t| t.as_str().to_string());
        if let Some(t) = &target {
            if !t.contains('/') {
                warn!(target = %t, "merge target has no iteration prefix");
            }
        }
        Some((branch, target))
    }

    /// Headline, optional type line, then free-text description.
    pub fn parse_merge_message(&self, message: &str) -> Option<MergeMessage> {
        let (headline, rest) = match message.split_once('\n') {
            Some((h, r)) => (h.trim_end_matches('\r'), r),
            None => (message, ""),
        };
        let (branch, target) = self.parse_merge_headline(headline)?;
        // only the blank separator line goes; the description is kept verbatim
        let rest = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .unwrap_or(rest);
        let (type_line, after_type) = match rest.split_once('\n') {
            Some((l, r)) => (l.trim_end_matches('\r'), r),
            None => (rest, ""),
        };
        let (merge_type, description) = match type_line.parse::<MergeType>() {
            Ok(t) => (t, after_type),
            Err(_) => (MergeType::default(), rest),
        };
        Some(MergeMessage {
            branch,
            target,
            merge_type,
            description: (!description.is_empty()).then(|| description.to_string()),
        })
    }

    /// `Revert "<merge headline>"` plus the `This reverts commit` trailer.
    pub fn parse_revert_message(&self, message: &str) -> Option<RevertMessage> {
        let caps = self.revert_message.captures(message)?;
        let (branch, target) = self.parse_merge_headline(caps.get(1)?.as_str())?;
        Some(RevertMessage {
            branch,
            target,
            reverted_sha: caps.get(2)?.as_str().to_string(),
        })
    }

    pub fn classify(&self, message: &str) -> ParsedMessage {
        if message.starts_with("Revert \"") {
            return match self.parse_revert_message(message) {
                Some(r) => ParsedMessage::Revert(r),
                None => ParsedMessage::Unrecognized,
            };
        }
        match self.parse_merge_message(message) {
            Some(m) => ParsedMessage::Merge(m),
            None => ParsedMessage::Unrecognized,
        }
    }
}

/// `git rev-list --grep` pattern matching merges of one topic in any
/// iteration and version.
pub fn topic_merge_grep(topic: &str) -> String {
    format!("^Merge branch '([^/]+/)?{}(_v[0-9]+)?'.*$", escape_ere(topic))
}

/// Escape POSIX extended regexp metacharacters.
fn escape_ere(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '.' | '[' | ']' | '(' | ')' | '*' | '+' | '?' | '{' | '}' | '|' | '^' | '$' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> MessageParser {
        MessageParser::new().unwrap()
    }

    #[test]
    fn test_split_branch_name() {
        let p = parser();
        let parts = p.split_branch_name("1/a_v2").unwrap();
        assert_eq!(parts.prefix.as_deref(), Some("1"));
        assert_eq!(parts.name, "a");
        assert_eq!(parts.version, Some(2));

        let parts = p.split_branch_name("topic").unwrap();
        assert_eq!(parts.prefix, None);
        assert_eq!(parts.name, "topic");
        assert_eq!(parts.version, None);

        let parts = p.split_branch_name("feature/login/form_v3").unwrap();
        assert_eq!(parts.prefix.as_deref(), Some("feature"));
        assert_eq!(parts.name, "login/form");
        let folded = parts.without_iteration();
        assert_eq!(folded.name, "feature/login/form");
        assert_eq!(folded.version, Some(3));
    }

    #[test]
    fn test_split_branch_name_rejects_bad_versions() {
        let p = parser();
        assert!(p.split_branch_name("1/a_v0").is_none());
        assert!(p.split_branch_name("a_v99999999999999999999").is_none());
        assert!(p.split_branch_name("").is_none());
    }

    #[test]
    fn test_parse_merge_headline() {
        let p = parser();
        assert_eq!(
            p.parse_merge_headline("Merge branch '1/a_v1' into 1/develop"),
            Some(("1/a_v1".to_string(), Some("1/develop".to_string())))
        );
        assert_eq!(
            p.parse_merge_headline("Merge branch '1/a_v1'"),
            Some(("1/a_v1".to_string(), None))
        );
        assert_eq!(
            p.parse_merge_headline("Merge branch '1/a_v1' into topic"),
            Some(("1/a_v1".to_string(), Some("topic".to_string())))
        );
        assert_eq!(p.parse_merge_headline("Merge remote-tracking branch 'x'"), None);
        assert_eq!(p.parse_merge_headline("Fix typo"), None);
    }

    #[test]
    fn test_parse_merge_message_full() {
        let p = parser();
        let m = p
            .parse_merge_message("Merge branch '1/a_v1' into 1/develop\n\nFIX\nFixes crash\non start")
            .unwrap();
        assert_eq!(m.branch, "1/a_v1");
        assert_eq!(m.target.as_deref(), Some("1/develop"));
        assert_eq!(m.merge_type, MergeType::Fix);
        assert_eq!(m.description.as_deref(), Some("Fixes crash\non start"));
    }

    #[test]
    fn test_parse_merge_message_defaults() {
        let p = parser();
        let m = p.parse_merge_message("Merge branch '1/a_v1'").unwrap();
        assert_eq!(m.merge_type, MergeType::Euf);
        assert_eq!(m.description, None);
        assert_eq!(m.target, None);

        // Unrecognized second line becomes the description.
        let m = p
            .parse_merge_message("Merge branch '1/a_v1' into 1/staging\n\nsome text\nmore")
            .unwrap();
        assert_eq!(m.merge_type, MergeType::Euf);
        assert_eq!(m.description.as_deref(), Some("some text\nmore"));

        let m = p.parse_merge_message("Merge branch 'b' into 1/develop\n\nDEV\n").unwrap();
        assert_eq!(m.merge_type, MergeType::Dev);
        assert_eq!(m.description, None);
    }

    #[test]
    fn test_description_whitespace_survives_parse() {
        let p = parser();
        for description in ["\n\nafter blank lines", "trailing spaces   ", "  indented\n\n"] {
            let msg = MergeMessage {
                branch: "1/a_v1".into(),
                target: Some("1/develop".into()),
                merge_type: MergeType::Fix,
                description: Some(description.into()),
            };
            let parsed = p.parse_merge_message(&msg.to_string()).unwrap();
            assert_eq!(parsed.description.as_deref(), Some(description));
            assert_eq!(parsed.merge_type, MergeType::Fix);
        }
    }

    #[test]
    fn test_merge_message_round_trip() {
        let p = parser();
        let cases = [
            MergeMessage {
                branch: "1/a_v1".into(),
                target: Some("1/develop".into()),
                merge_type: MergeType::Dev,
                description: Some("Refactor storage".into()),
            },
            MergeMessage {
                branch: "2/feature/x_v3".into(),
                target: None,
                merge_type: MergeType::Euf,
                description: None,
            },
            MergeMessage {
                branch: "1/b_v2".into(),
                target: Some("1/staging".into()),
                merge_type: MergeType::Fix,
                description: Some("line one\nline two".into()),
            },
        ];
        for case in cases {
            let text = case.to_string();
            assert_eq!(p.parse_merge_message(&text), Some(case));
        }
    }

    #[test]
    fn test_format_omits_into_for_master() {
        let m = MergeMessage {
            branch: "1/a_v1".into(),
            target: None,
            merge_type: MergeType::Fix,
            description: Some("desc".into()),
        };
        assert_eq!(m.to_string(), "Merge branch '1/a_v1'\n\nFIX\ndesc");
    }

    #[test]
    fn test_parse_revert_message() {
        let p = parser();
        let msg = "Revert \"Merge branch '1/a_v1' into 1/develop\"\n\n\
                   This reverts commit 0123abcd, reversing\nchanges made to 89ef4567.";
        let r = p.parse_revert_message(msg).unwrap();
        assert_eq!(r.branch, "1/a_v1");
        assert_eq!(r.target.as_deref(), Some("1/develop"));
        assert_eq!(r.reverted_sha, "0123abcd");

        let plain = "Revert \"Merge branch '1/a_v1' into 1/develop\"\n\nThis reverts commit deadbeef.";
        assert_eq!(p.parse_revert_message(plain).unwrap().reverted_sha, "deadbeef");

        assert!(p.parse_revert_message("Revert \"Fix typo\"\n\nThis reverts commit abc.").is_none());
    }

    #[test]
    fn test_classify() {
        let p = parser();
        assert!(matches!(p.classify("Merge branch '1/a_v1' into 1/develop"), ParsedMessage::Merge(_)));
        assert!(matches!(
            p.classify("Revert \"Merge branch '1/a_v1'\"\n\nThis reverts commit abc1234."),
            ParsedMessage::Revert(_)
        ));
        assert_eq!(p.classify("Initial commit"), ParsedMessage::Unrecognized);
        assert_eq!(p.classify("Revert \"Initial commit\""), ParsedMessage::Unrecognized);
    }

    #[test]
    fn test_topic_merge_grep_escapes() {
        assert_eq!(topic_merge_grep("a"), "^Merge branch '([^/]+/)?a(_v[0-9]+)?'.*$");
        assert!(topic_merge_grep("a.b").contains(r"a\.b"));
        assert!(topic_merge_grep("my-topic").contains("my-topic"));
    }
}
