//! Error types for the git-aflow core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Whether this error carries a diagnostic meant for the user rather
    /// than an internal failure.
    pub fn is_user_facing(&self) -> bool {
        match self {
            CoreError::Flow(e) => e.is_user_facing(),
            CoreError::Git(GitError::NotARepository(_)) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from the `git` subprocess layer.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with an unexpected status.
    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// `git merge` reported that the target already contains the object.
    #[error("already up to date with {0}")]
    AlreadyMerged(String),

    /// Writing `MERGE_MSG` into the git directory failed.
    #[error("failed to write merge message: {0}")]
    MergeMsg(String),

    /// The working directory is not inside a git repository.
    #[error("not a git repository: {0}")]
    NotARepository(String),

    /// I/O error while spawning or talking to `git`.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

/// Contract violations while deriving topic records from history.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A derived property was requested on a record lacking required fields.
    #[error("incomplete merge object: {0}")]
    IncompleteMergeObject(String),

    /// The branch name cannot describe a topic revision.
    #[error("invalid topic branch name '{0}'")]
    InvalidBranchName(String),

    /// No iteration base point could be found for a treeish.
    #[error("cannot determine iteration of '{0}'")]
    UnknownIteration(String),

    /// A built-in message pattern failed to compile.
    #[error("invalid message pattern: {0}")]
    InvalidPattern(#[from] regex_lite::Error),
}

// ---------------------------------------------------------------------------
// Workflow errors
// ---------------------------------------------------------------------------

/// Failures of the finish/merge/revert/... workflows.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A user-facing refusal; nothing was left half-done.
    #[error("{0}")]
    User(String),

    /// A dependency of a revision being merged is absent at the destination.
    #[error(
        "Merge failed. Topic {revision} depends on {dependency}. Try merge it first or use \
         \"git af merge -d\" to merge dependencies automatically"
    )]
    MissingDependency { revision: String, dependency: String },

    /// An elder version that must precede a merged revision is not in the sources.
    #[error(
        "Merge failed. We should merge {revision} along with {elder}, but {elder} is absent in \
         sources."
    )]
    MissingElderVersion { revision: String, elder: String },

    /// The conflict predictor found overlapping changes.
    #[error("Finish failed because of conflicts between {first} and {second} in file {file}")]
    Conflict {
        first: String,
        second: String,
        file: String,
    },

    /// A real merge or revert conflicted although the predictor said it
    /// would not. The branch has been reset.
    #[error("{0}")]
    UnexpectedConflict(String),

    /// A merge or revert failed for a reason other than a conflict.
    #[error("merge failed unexpectedly: {0}")]
    MergeNonConflict(String),
}

impl FlowError {
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, FlowError::MergeNonConflict(_))
    }
}

/// Shorthand for a user-facing refusal.
pub fn user_error<T>(message: impl Into<String>) -> Result<T, CoreError> {
    Err(CoreError::Flow(FlowError::User(message.into())))
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
