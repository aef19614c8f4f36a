//! Collaborators around the reading engine.

pub mod progress;

pub use progress::{MemoryProgressStore, ProgressKey, ProgressRecord, ProgressReporter, ProgressStore};
