//! Local Git repository operations via the `git` CLI.
//!
//! All commands run synchronously in the repository top-level directory.
//! Read commands are memoized in a [`ReadCache`]; every mutating command
//! invalidates the cache groups it can affect.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, instrument, warn};

use super::cache::{CacheGroup, CachedOutput, ReadCache, REF_READ};
use crate::errors::GitError;

/// Result of a merge or revert that may stop on conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Conflicted,
}

impl ApplyOutcome {
    pub fn is_applied(self) -> bool {
        self == ApplyOutcome::Applied
    }
}

const AFTER_COMMIT: &[CacheGroup] = &[CacheGroup::Branches, CacheGroup::Commits, CacheGroup::Index];

/// Synchronous client wrapping the `git` binary.
pub struct GitCli {
    root: PathBuf,
    git_dir: PathBuf,
    cache: ReadCache,
}

impl GitCli {
    /// Open the repository containing `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let output = spawn(path, &["rev-parse", "--show-toplevel", "--absolute-git-dir"])?;
        if output.exit_code != 0 {
            return Err(GitError::NotARepository(path.display().to_string()));
        }
        let mut lines = output.stdout.lines();
        let (root, git_dir) = match (lines.next(), lines.next()) {
            (Some(root), Some(git_dir)) => (PathBuf::from(root), PathBuf::from(git_dir)),
            _ => return Err(GitError::NotARepository(path.display().to_string())),
        };
        info!(root = %root.display(), "opened git repository");
        Ok(Self {
            root,
            git_dir,
            cache: ReadCache::new(),
        })
    }

    /// Repository top-level directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    // -----------------------------------------------------------------------
    // Commits and history
    // -----------------------------------------------------------------------

    /// Resolve a treeish to a full commit SHA.
    pub fn rev_parse(&self, treeish: &str) -> Result<String, GitError> {
        let spec = format!("{}^{{commit}}", treeish);
        self.read(REF_READ, &["rev-parse", "--verify", "-q", &spec])
    }

    /// Like [`rev_parse`](Self::rev_parse) but `None` for unknown treeishes.
    pub fn try_rev_parse(&self, treeish: &str) -> Result<Option<String>, GitError> {
        let spec = format!("{}^{{commit}}", treeish);
        self.read_01(REF_READ, &["rev-parse", "--verify", "-q", &spec])
    }

    pub fn current_sha(&self) -> Result<String, GitError> {
        self.read(&[CacheGroup::Branches], &["rev-parse", "HEAD"])
    }

    /// Full commit message without the trailing newline.
    pub fn full_message(&self, treeish: &str) -> Result<String, GitError> {
        let raw = self.read(REF_READ, &["rev-list", "--format=%B", "-s", "-n1", treeish])?;
        // First line is "commit <sha>".
        let message: Vec<&str> = raw.lines().skip(1).collect();
        Ok(message.join("\n").trim_end().to_string())
    }

    /// SHA of parent `n` (1-based), or `None` when it does not exist.
    pub fn parent(&self, treeish: &str, n: u32) -> Result<Option<String>, GitError> {
        let spec = format!("{}^{}", treeish, n);
        self.read_01(REF_READ, &["rev-parse", "-q", "--verify", &spec])
    }

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        if self.rev_parse(ancestor)? == self.rev_parse(descendant)? {
            return Ok(false);
        }
        self.check_01(REF_READ, &["merge-base", "--is-ancestor", ancestor, descendant])
    }

    /// Whether `ancestor` is reachable from `descendant` following first
    /// parents only.
    pub fn is_based_on(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let range = format!("{}..{}", ancestor, descendant);
        let out = self.read(REF_READ, &["rev-list", "--first-parent", &range, "--"])?;
        let last = match out.lines().last() {
            Some(last) => last.to_string(),
            None => return Ok(false),
        };
        // rev-list prints commits even when the first-parent walk misses
        // the ancestor, so the oldest one must sit right on top of it.
        Ok(self.parent(&last, 1)?.as_deref() == Some(self.rev_parse(ancestor)?.as_str()))
    }

    /// First-parent commits in `from..to`, newest first unless `reverse`.
    /// `greps` are extended regexps OR-ed against the commit message.
    pub fn commits_between(
        &self,
        from: &str,
        to: &str,
        reverse: bool,
        greps: &[&str],
    ) -> Result<Vec<String>, GitError> {
        let mut args: Vec<String> = vec![
            "rev-list".into(),
            "--ancestry-path".into(),
            "--topo-order".into(),
            "--first-parent".into(),
        ];
        if reverse {
            args.push("--reverse".into());
        }
        push_greps(&mut args, greps);
        args.push(format!("{}..{}", from, to));
        args.push("--".into());
        let out = self.read_owned(REF_READ, args)?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// First-parent commits reachable from any of `heads`, filtered by `greps`.
    pub fn find_commits(&self, heads: &[String], greps: &[&str]) -> Result<Vec<String>, GitError> {
        let mut args: Vec<String> = vec!["rev-list".into(), "--first-parent".into()];
        push_greps(&mut args, greps);
        args.extend(heads.iter().cloned());
        args.push("--".into());
        let out = self.read_owned(REF_READ, args)?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Number of commits reachable from `treeish`.
    pub fn commit_count(&self, treeish: &str) -> Result<usize, GitError> {
        let out = self.read(REF_READ, &["rev-list", "--count", treeish, "--"])?;
        out.trim().parse().map_err(|_| GitError::CommandFailed {
            command: "rev-list --count".into(),
            exit_code: 0,
            stderr: format!("unexpected output '{}'", out),
        })
    }

    /// Best common ancestor of all `heads`, `None` if they share no history.
    pub fn merge_base(&self, heads: &[&str]) -> Result<Option<String>, GitError> {
        let mut args = vec!["merge-base", "--octopus"];
        args.extend_from_slice(heads);
        self.read_01(REF_READ, &args)
    }

    /// Unified diff between two treeishes without context lines.
    pub fn diff(&self, from: &str, to: &str, files: &[&str]) -> Result<String, GitError> {
        let mut args = vec![
            "diff",
            "--no-color",
            "--no-ext-diff",
            "--no-renames",
            "-U0",
            from,
            to,
            "--",
        ];
        args.extend_from_slice(files);
        self.read(REF_READ, &args)
    }

    /// Paths that differ between two treeishes.
    pub fn list_files_differ(&self, from: &str, to: &str) -> Result<Vec<String>, GitError> {
        let out = self.read(
            REF_READ,
            &["diff", "--numstat", "--no-renames", "-z", from, to, "--"],
        )?;
        // With -z each record is "added\tdeleted\tpath\0".
        Ok(out
            .split('\0')
            .filter_map(|record| record.splitn(3, '\t').nth(2))
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Whether `path` exists in the tree of `treeish`.
    pub fn has_path(&self, treeish: &str, path: &str) -> Result<bool, GitError> {
        let out = self.read(REF_READ, &["ls-tree", "--name-only", treeish, "--", path])?;
        Ok(!out.trim().is_empty())
    }

    // -----------------------------------------------------------------------
    // Index and working tree
    // -----------------------------------------------------------------------

    /// Whether tracked files have no staged or unstaged changes.
    pub fn is_working_tree_clean(&self) -> Result<bool, GitError> {
        let out = self.read(&[CacheGroup::Index, CacheGroup::Branches], &["status", "--porcelain", "-uno"])?;
        Ok(out.trim().is_empty())
    }

    pub fn untracked_files(&self) -> Result<Vec<String>, GitError> {
        let out = self.read(&[CacheGroup::Index, CacheGroup::Branches], &["status", "--porcelain", "-uall"])?;
        Ok(out
            .lines()
            .filter_map(|l| l.strip_prefix("?? "))
            .map(str::to_string)
            .collect())
    }

    /// Paths with unresolved conflicts in the index.
    pub fn unmerged_files(&self) -> Result<Vec<String>, GitError> {
        let out = self.read(&[CacheGroup::Index], &["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    #[instrument(skip(self))]
    pub fn checkout(&self, treeish: &str) -> Result<(), GitError> {
        self.write(&[CacheGroup::Branches, CacheGroup::Index], &["checkout", "-q", treeish])?;
        Ok(())
    }

    /// `git merge --no-ff` with an explicit message.
    #[instrument(skip(self, message))]
    pub fn merge(&self, treeish: &str, message: &str) -> Result<ApplyOutcome, GitError> {
        let args = ["merge", "--no-ff", "--no-edit", "-m", message, treeish];
        let out = self.run_uncached(&args)?;
        match out.exit_code {
            0 if is_already_up_to_date(&out.stdout) => Err(GitError::AlreadyMerged(treeish.to_string())),
            0 => {
                self.cache.invalidate(AFTER_COMMIT);
                Ok(ApplyOutcome::Applied)
            }
            1 if out.stdout.lines().any(|l| l.starts_with("CONFLICT")) => {
                self.cache.invalidate(&[CacheGroup::Index]);
                info!(treeish, "merge conflicted");
                Ok(ApplyOutcome::Conflicted)
            }
            code => {
                self.cache.invalidate(&[CacheGroup::Index]);
                Err(failed(&args, code, out.stdout))
            }
        }
    }

    pub fn abort_merge(&self) -> Result<(), GitError> {
        self.write(&[CacheGroup::Index], &["merge", "--abort"])?;
        Ok(())
    }

    /// `git revert`, optionally against mainline `parent` and without
    /// committing.
    #[instrument(skip(self))]
    pub fn revert(&self, treeish: &str, parent: Option<u32>, no_commit: bool) -> Result<ApplyOutcome, GitError> {
        let mainline = parent.map(|p| format!("-m{}", p));
        let mut args = vec!["revert", "--no-edit"];
        if let Some(m) = mainline.as_deref() {
            args.push(m);
        }
        if no_commit {
            args.push("-n");
        }
        args.push(treeish);
        let out = self.run_uncached(&args)?;
        match out.exit_code {
            0 => {
                if no_commit {
                    self.cache.invalidate(&[CacheGroup::Index]);
                } else {
                    self.cache.invalidate(AFTER_COMMIT);
                }
                Ok(ApplyOutcome::Applied)
            }
            1 => {
                self.cache.invalidate(&[CacheGroup::Index]);
                info!(treeish, "revert conflicted");
                Ok(ApplyOutcome::Conflicted)
            }
            code => {
                self.cache.invalidate(&[CacheGroup::Index]);
                Err(failed(&args, code, out.stdout))
            }
        }
    }

    /// Abort an in-progress revert, falling back to `reset --merge` when no
    /// sequencer state exists (`revert -n`).
    pub fn abort_revert(&self) -> Result<(), GitError> {
        let out = self.run_uncached(&["revert", "--abort"])?;
        self.cache.invalidate(&[CacheGroup::Branches, CacheGroup::Index]);
        if out.exit_code != 0 {
            debug!("no revert in progress, resetting index");
            self.write(&[CacheGroup::Index], &["reset", "--merge"])?;
        }
        Ok(())
    }

    /// Commit the index. Returns `false` when unmerged files prevent it.
    #[instrument(skip(self, message))]
    pub fn commit(&self, message: Option<&str>, allow_empty: bool) -> Result<bool, GitError> {
        let mut args = vec!["commit", "--no-edit"];
        if let Some(m) = message {
            args.push("-m");
            args.push(m);
        }
        if allow_empty {
            args.push("--allow-empty");
        }
        let out = self.run_uncached(&args)?;
        if out.exit_code == 0 {
            self.cache.invalidate(AFTER_COMMIT);
            return Ok(true);
        }
        if out.stdout.contains("unmerged files") {
            info!("commit failed due to unresolved conflicts");
            return Ok(false);
        }
        Err(failed(&args, out.exit_code, out.stdout))
    }

    /// Write `MERGE_MSG` so a manual `git commit --no-edit` after conflict
    /// resolution uses the workflow's message.
    pub fn set_merge_msg(&self, message: &str) -> Result<(), GitError> {
        let path = self.git_dir.join("MERGE_MSG");
        std::fs::write(&path, message).map_err(|e| GitError::MergeMsg(format!("{}: {}", path.display(), e)))
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    /// Current branch name, `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        self.read_01(&[CacheGroup::Branches], &["symbolic-ref", "--short", "-q", "HEAD"])
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let full = format!("refs/heads/{}", name);
        self.check_01(&[CacheGroup::Branches], &["show-ref", "--verify", "-q", &full])
    }

    /// Local branches, optionally restricted to glob `patterns`.
    pub fn list_branches(&self, patterns: &[&str]) -> Result<Vec<String>, GitError> {
        let mut args = vec!["branch", "--list", "--format=%(refname:short)"];
        args.extend_from_slice(patterns);
        let out = self.read(&[CacheGroup::Branches], &args)?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn create_branch(&self, name: &str, start: &str) -> Result<(), GitError> {
        self.write(&[CacheGroup::Branches], &["branch", name, start])?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        self.write(&[CacheGroup::Branches], &["branch", "-D", name])?;
        Ok(())
    }

    /// Hard-reset the current branch to `treeish`.
    #[instrument(skip(self))]
    pub fn reset_hard(&self, treeish: &str) -> Result<(), GitError> {
        self.write(AFTER_COMMIT, &["reset", "-q", "--hard", treeish])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    pub fn list_tags(&self) -> Result<Vec<String>, GitError> {
        let out = self.read(&[CacheGroup::Tags], &["tag", "--list"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn tag_exists(&self, name: &str) -> Result<bool, GitError> {
        let full = format!("refs/tags/{}", name);
        self.check_01(&[CacheGroup::Tags], &["show-ref", "--verify", "-q", &full])
    }

    pub fn tags_pointing_at(&self, treeish: &str) -> Result<Vec<String>, GitError> {
        let out = self.read(
            &[CacheGroup::Tags, CacheGroup::Branches, CacheGroup::Commits],
            &["tag", "--points-at", treeish],
        )?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn create_tag(&self, name: &str, target: &str) -> Result<(), GitError> {
        self.write(&[CacheGroup::Tags], &["tag", name, target])?;
        Ok(())
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), GitError> {
        self.write(&[CacheGroup::Tags], &["tag", "-d", name])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Misc
    // -----------------------------------------------------------------------

    /// Whether `name` is a valid branch name.
    pub fn is_valid_ref_name(&self, name: &str) -> Result<bool, GitError> {
        let full = format!("refs/heads/{}", name);
        self.check_01(&[], &["check-ref-format", &full])
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Cached read that must exit 0; returns stdout without the trailing newline.
    fn read(&self, groups: &[CacheGroup], args: &[&str]) -> Result<String, GitError> {
        let out = self.cached(groups, args.iter().map(|s| s.to_string()).collect())?;
        if out.exit_code != 0 {
            return Err(failed(args, out.exit_code, out.stdout));
        }
        Ok(out.stdout)
    }

    fn read_owned(&self, groups: &[CacheGroup], args: Vec<String>) -> Result<String, GitError> {
        let out = self.cached(groups, args.clone())?;
        if out.exit_code != 0 {
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            return Err(failed(&refs, out.exit_code, out.stdout));
        }
        Ok(out.stdout)
    }

    /// Cached read where exit 1 means "no value".
    fn read_01(&self, groups: &[CacheGroup], args: &[&str]) -> Result<Option<String>, GitError> {
        let out = self.cached(groups, args.iter().map(|s| s.to_string()).collect())?;
        match out.exit_code {
            0 => Ok(Some(out.stdout)),
            1 => Ok(None),
            code => Err(failed(args, code, out.stdout)),
        }
    }

    /// Cached predicate: exit 0 is true, exit 1 is false.
    fn check_01(&self, groups: &[CacheGroup], args: &[&str]) -> Result<bool, GitError> {
        Ok(self.read_01(groups, args)?.is_some())
    }

    fn cached(&self, groups: &[CacheGroup], args: Vec<String>) -> Result<CachedOutput, GitError> {
        if let Some(hit) = self.cache.get(&args) {
            return Ok(hit);
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = spawn(&self.root, &refs)?;
        self.cache.insert(args, groups, out.clone());
        Ok(out)
    }

    /// Mutating command that must exit 0.
    fn write(&self, invalidates: &[CacheGroup], args: &[&str]) -> Result<String, GitError> {
        let out = self.run_uncached(args);
        self.cache.invalidate(invalidates);
        let out = out?;
        if out.exit_code != 0 {
            return Err(failed(args, out.exit_code, out.stdout));
        }
        Ok(out.stdout)
    }

    fn run_uncached(&self, args: &[&str]) -> Result<CachedOutput, GitError> {
        spawn(&self.root, args)
    }
}

fn push_greps(args: &mut Vec<String>, greps: &[&str]) {
    if !greps.is_empty() {
        args.push("-E".into());
        args.extend(greps.iter().map(|g| format!("--grep={}", g)));
    }
}

fn is_already_up_to_date(stdout: &str) -> bool {
    stdout.contains("Already up to date") || stdout.contains("Already up-to-date")
}

/// Build a `CommandFailed`; `stderr` holds the combined command output.
fn failed(args: &[&str], exit_code: i32, output: String) -> GitError {
    let command = args.first().copied().unwrap_or_default().to_string();
    warn!(exit_code, %output, command = %args.join(" "), "git command failed");
    GitError::CommandFailed {
        command,
        exit_code,
        stderr: output,
    }
}

/// Run `git args` in `dir`. Stdout and stderr are captured; the returned
/// `stdout` holds stdout with stderr appended when the command failed.
fn spawn(dir: &Path, args: &[&str]) -> Result<CachedOutput, GitError> {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .args(args)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(cmd = ?format!("git {}", args.join(" ")), "running git command");
    let output = cmd.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GitError::BinaryNotFound("git".into())
        } else {
            GitError::IoError(e)
        }
    })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let mut stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if exit_code != 0 {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !stdout.is_empty() && !stdout.ends_with('\n') {
                stdout.push('\n');
            }
            stdout.push_str(&stderr);
        }
    }
    let trimmed_len = stdout.trim_end_matches(['\n', '\r']).len();
    stdout.truncate(trimmed_len);
    Ok(CachedOutput { stdout, exit_code })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_up_to_date_variants() {
        assert!(is_already_up_to_date("Already up to date."));
        assert!(is_already_up_to_date("Already up-to-date."));
        assert!(!is_already_up_to_date("Merge made by the 'ort' strategy."));
    }

    #[test]
    fn test_push_greps() {
        let mut args = vec!["rev-list".to_string()];
        push_greps(&mut args, &["^Merge branch .*$", "^Revert \"Merge branch .*\"$"]);
        assert_eq!(
            args,
            vec![
                "rev-list",
                "-E",
                "--grep=^Merge branch .*$",
                "--grep=^Revert \"Merge branch .*\"$"
            ]
        );

        let mut args = vec!["rev-list".to_string()];
        push_greps(&mut args, &[]);
        assert_eq!(args, vec!["rev-list"]);
    }

    #[test]
    fn test_failed_keeps_output() {
        let err = failed(&["merge-base", "a", "b"], 128, "fatal: Not a valid object name a".into());
        match err {
            GitError::CommandFailed { command, exit_code, stderr } => {
                assert_eq!(command, "merge-base");
                assert_eq!(exit_code, 128);
                assert!(stderr.contains("Not a valid object name"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_open_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        match GitCli::open(dir.path()) {
            Err(GitError::NotARepository(_)) | Err(GitError::BinaryNotFound(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => {
                // The temp dir may live inside a checkout on some machines.
            }
        }
    }
}
