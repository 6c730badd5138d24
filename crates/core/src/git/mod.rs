//! Git capability layer: the `git` CLI client and its read cache.

pub mod cache;
pub mod client;

pub use cache::{CacheGroup, ReadCache};
pub use client::{ApplyOutcome, GitCli};
