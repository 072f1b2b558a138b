//! Storage for Tally.
//!
//! Explorations and statistics snapshots are read-only inputs; answer
//! collections and answer logs are owned here. Each has a file-based and an
//! in-memory backend.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::{FileAnswerStore, FileExplorationStore, FileStatisticsStore};
pub use memory::{MemoryAnswerStore, MemoryExplorationStore, MemoryStatisticsStore};
pub use traits::{AnswerStore, ExplorationStore, StatisticsStore};
