//! Iterations: a base-point tag plus its develop and staging branches.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::errors::{user_error, CoreError, GitError};
use crate::repo::Repo;

/// A named iteration. `develop` and `staging` are full branch names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Iteration {
    pub name: String,
    pub develop: String,
    pub staging: String,
}

impl fmt::Display for Iteration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Repo {
    pub fn iteration(&self, name: &str) -> Iteration {
        Iteration {
            name: name.to_string(),
            develop: format!("{}/{}", name, self.branches().develop),
            staging: format!("{}/{}", name, self.branches().staging),
        }
    }

    pub fn is_valid_iteration_name(&self, name: &str) -> Result<bool, GitError> {
        if name.is_empty() || name.contains('/') {
            return Ok(false);
        }
        let it = self.iteration(name);
        let git = self.git();
        Ok(git.is_valid_ref_name(name)? && git.is_valid_ref_name(&it.develop)? && git.is_valid_ref_name(&it.staging)?)
    }

    /// Tag and both branches exist.
    pub fn iteration_exists(&self, it: &Iteration) -> Result<bool, GitError> {
        let git = self.git();
        Ok(self.is_valid_iteration_name(&it.name)?
            && git.tag_exists(&it.name)?
            && git.branch_exists(&it.develop)?
            && git.branch_exists(&it.staging)?)
    }

    pub fn is_iteration(&self, name: &str) -> Result<bool, GitError> {
        self.iteration_exists(&self.iteration(name))
    }

    /// All iterations; with `sorted`, ancestors come first.
    pub fn iterations(&self, sorted: bool) -> Result<Vec<Iteration>, GitError> {
        let mut result = Vec::new();
        for tag in self.git().list_tags()? {
            let it = self.iteration(&tag);
            if self.iteration_exists(&it)? {
                result.push(it);
            }
        }
        if sorted {
            let mut keyed = Vec::with_capacity(result.len());
            for it in result {
                keyed.push((self.git().commit_count(&it.name)?, it));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
            result = keyed.into_iter().map(|(_, it)| it).collect();
        }
        Ok(result)
    }

    pub fn first_iteration(&self) -> Result<Option<Iteration>, GitError> {
        Ok(self.iterations(true)?.into_iter().next())
    }

    pub fn last_iteration(&self) -> Result<Option<Iteration>, GitError> {
        Ok(self.iterations(true)?.pop())
    }

    pub fn next_iteration(&self, it: &Iteration) -> Result<Option<Iteration>, GitError> {
        let all = self.iterations(true)?;
        Ok(all
            .iter()
            .position(|i| i == it)
            .and_then(|pos| all.get(pos + 1).cloned()))
    }

    pub fn prev_iteration(&self, it: &Iteration) -> Result<Option<Iteration>, GitError> {
        let all = self.iterations(true)?;
        Ok(all
            .iter()
            .position(|i| i == it)
            .and_then(|pos| pos.checked_sub(1))
            .and_then(|pos| all.get(pos).cloned()))
    }

    /// Walk first parents from the parent of `treeish`; the first commit an
    /// iteration tag points at identifies the iteration.
    pub fn iteration_by_sha(&self, treeish: &str) -> Result<Option<Iteration>, GitError> {
        let mut by_sha = Vec::new();
        for it in self.iterations(false)? {
            by_sha.push((self.git().rev_parse(&it.name)?, it));
        }
        if by_sha.is_empty() {
            return Ok(None);
        }
        let mut pos = self.git().parent(treeish, 1)?;
        while let Some(sha) = pos {
            if let Some((_, it)) = by_sha.iter().find(|(s, _)| *s == sha) {
                debug!(treeish, iteration = %it, base_point = %sha, "found iteration");
                return Ok(Some(it.clone()));
            }
            pos = self.git().parent(&sha, 1)?;
        }
        info!(treeish, "cannot get iteration");
        Ok(None)
    }

    /// Iteration prefix of the branch name, else a base-point tag on the
    /// branch head, else the first-parent walk.
    pub fn iteration_by_branch(&self, branch: &str) -> Result<Option<Iteration>, GitError> {
        if let Some((prefix, _)) = branch.split_once('/') {
            let it = self.iteration(prefix);
            if self.iteration_exists(&it)? {
                return Ok(Some(it));
            }
        }
        for tag in self.git().tags_pointing_at(branch)? {
            let it = self.iteration(&tag);
            if self.iteration_exists(&it)? {
                return Ok(Some(it));
            }
        }
        self.iteration_by_sha(branch)
    }

    pub fn iteration_by_treeish(&self, treeish: &str) -> Result<Option<Iteration>, GitError> {
        if self.git().branch_exists(treeish)? {
            self.iteration_by_branch(treeish)
        } else {
            self.iteration_by_sha(treeish)
        }
    }

    pub fn current_iteration(&self) -> Result<Option<Iteration>, GitError> {
        match self.git().current_branch()? {
            Some(branch) => self.iteration_by_branch(&branch),
            None => self.iteration_by_sha("HEAD"),
        }
    }

    /// Head of master as seen from `it`: the next base point, or master
    /// itself for the last iteration.
    pub fn master_head(&self, it: &Iteration) -> Result<String, GitError> {
        match self.next_iteration(it)? {
            Some(next) => self.git().rev_parse(&next.name),
            None => Ok(self.master().to_string()),
        }
    }

    /// Tag master as iteration `name` and create its develop and staging.
    #[instrument(skip(self))]
    pub fn start_iteration(&self, name: &str) -> Result<Iteration, CoreError> {
        if !self.is_valid_iteration_name(name)? {
            return user_error(format!("Cannot start iteration, '{}' is not a valid name.", name));
        }
        let it = self.iteration(name);
        let git = self.git();
        if git.tag_exists(name)? {
            return user_error(format!("Cannot start iteration, tag {} exists.", name));
        }
        for branch in [&it.develop, &it.staging] {
            if git.branch_exists(branch)? {
                return user_error(format!("Cannot start iteration, branch {} exists.", branch));
            }
        }
        let master = self.master();
        if git.try_rev_parse(master)?.is_none() {
            return user_error(format!("Cannot start iteration, {} has no commits.", master));
        }

        git.create_tag(name, master)?;
        if let Err(e) = git.create_branch(&it.develop, master) {
            warn!(error = %e, "rolling back iteration start");
            git.delete_tag(name)?;
            return Err(e.into());
        }
        if let Err(e) = git.create_branch(&it.staging, master) {
            warn!(error = %e, "rolling back iteration start");
            git.delete_branch(&it.develop)?;
            git.delete_tag(name)?;
            return Err(e.into());
        }
        info!(iteration = %it, "iteration started");
        Ok(it)
    }
}
