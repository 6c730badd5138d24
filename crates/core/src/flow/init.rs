//! `git af init`: turn a repository into a git-aflow one.

use tracing::instrument;

use crate::errors::{user_error, CoreError};
use crate::iteration::Iteration;
use crate::repo::Repo;

use super::say;

/// Start the first iteration on master. Refused when any iteration exists.
#[instrument(skip(repo))]
pub fn init(repo: &Repo, name: &str) -> Result<Iteration, CoreError> {
    if !repo.iterations(false)?.is_empty() {
        return user_error("There is a git-aflow repo already, aborting");
    }
    let it = repo.start_iteration(name)?;
    say("Git-aflow initialized successfully");
    Ok(it)
}
