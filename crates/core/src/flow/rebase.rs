//! `git af rebase`: start the next iteration on top of master.

use tracing::instrument;

use crate::errors::{user_error, CoreError};
use crate::iteration::Iteration;
use crate::repo::Repo;

use super::say;

/// Topics are not ported; the new iteration starts empty.
#[instrument(skip(repo))]
pub fn rebase(repo: &Repo, name: &str) -> Result<Iteration, CoreError> {
    if repo.iterations(false)?.is_empty() {
        return user_error("There is no git-aflow repo here. Use \"git af init\" first.");
    }
    let it = repo.start_iteration(name)?;
    say(format!(
        "Iteration {} started. Develop is {}, staging is {}.",
        it, it.develop, it.staging
    ));
    Ok(it)
}
