//! git-aflow core library.
//!
//! Topic/iteration workflow on top of plain git: every topic merge, revert
//! and dependency is recovered from commit messages, so the repository
//! history is the only state. This crate provides the git client and read
//! cache, the history resolvers, the consistency checker, the conflict
//! predictor and the user-level workflows the `git-af` binary drives.

pub mod config;
pub mod conflict;
pub mod consistency;
pub mod dependency;
pub mod errors;
pub mod flow;
pub mod git;
pub mod history;
pub mod iteration;
pub mod message;
pub mod models;
pub mod repo;

// Re-exports for convenience.
pub use config::AflowConfig;
pub use errors::CoreError;
pub use git::GitCli;
pub use iteration::Iteration;
pub use models::{MergeType, Topic, TopicMerge, TopicRevert, TopicRevision};
pub use repo::Repo;
