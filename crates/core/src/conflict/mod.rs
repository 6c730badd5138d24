//! Conflict prediction.
//!
//! Detects overlapping changes between topic heads relative to their merge
//! bases before anything is merged.

pub mod detector;

pub use detector::{ChangeReader, Conflict, ConflictDetector, HeadGroup, Scope};
