//! Per-invocation repository context.
//!
//! [`Repo`] owns the git client (and with it the read cache), the compiled
//! message patterns and the branch naming configuration. Every resolver and
//! workflow borrows it; nothing is global.

use std::path::Path;

use tracing::debug;

use crate::config::{AflowConfig, BranchesConfig};
use crate::errors::{CoreError, GitError, ModelError};
use crate::git::GitCli;
use crate::message::MessageParser;

pub struct Repo {
    git: GitCli,
    parser: MessageParser,
    branches: BranchesConfig,
}

impl Repo {
    /// Open the repository containing `path` and load its configuration.
    pub fn open<P: AsRef<Path>>(path: P, config_path: Option<&Path>) -> Result<Self, CoreError> {
        let git = GitCli::open(path)?;
        let config = AflowConfig::discover(config_path, Some(git.git_dir()))?;
        Self::with_config(git, &config)
    }

    pub fn with_config(git: GitCli, config: &AflowConfig) -> Result<Self, CoreError> {
        let parser = MessageParser::new().map_err(ModelError::from)?;
        debug!(branches = ?config.branches, "repository context ready");
        Ok(Self {
            git,
            parser,
            branches: config.branches.clone(),
        })
    }

    pub fn git(&self) -> &GitCli {
        &self.git
    }

    pub fn parser(&self) -> &MessageParser {
        &self.parser
    }

    pub fn branches(&self) -> &BranchesConfig {
        &self.branches
    }

    pub fn master(&self) -> &str {
        &self.branches.master
    }

    // -----------------------------------------------------------------------
    // Branch roles
    // -----------------------------------------------------------------------

    pub fn is_master(&self, branch: &str) -> bool {
        branch == self.branches.master
    }

    pub fn is_develop(&self, branch: &str) -> Result<bool, GitError> {
        self.is_iteration_branch(branch, &self.branches.develop)
    }

    pub fn is_staging(&self, branch: &str) -> Result<bool, GitError> {
        self.is_iteration_branch(branch, &self.branches.staging)
    }

    pub fn is_release(&self, branch: &str) -> bool {
        branch
            .strip_prefix(self.branches.release.as_str())
            .map_or(false, |rest| rest.starts_with('/'))
    }

    /// master, develop, staging and release branches accept no manual work.
    pub fn is_protected(&self, branch: &str) -> Result<bool, GitError> {
        Ok(self.is_master(branch) || self.is_release(branch) || self.is_develop(branch)? || self.is_staging(branch)?)
    }

    fn is_iteration_branch(&self, branch: &str, suffix: &str) -> Result<bool, GitError> {
        match branch.split_once('/') {
            Some((prefix, rest)) if rest == suffix => self.is_iteration(prefix),
            _ => Ok(false),
        }
    }

    /// Complete `develop`/`staging` with the iteration prefix.
    pub fn complete_branch_name(&self, name: &str, iteration: &str) -> String {
        if name == self.branches.develop || name == self.branches.staging {
            format!("{}/{}", iteration, name)
        } else {
            name.to_string()
        }
    }
}
