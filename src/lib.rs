//! Tally - answer statistics for interactive explorations
//!
//! Tally records the answers learners submit in each state of an
//! exploration, keeps per-rule counts of distinct answers that creators can
//! resolve, and ranks the states that most need improvement using batch
//! hit counts.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod stats;
pub mod storage;
pub mod util;

pub use config::Config;
pub use core::{
    rank_states, AnswerLog, AnswerRecord, AnswerSubmission, AnswerValue, Exploration,
    ExplorationStatistics, ImprovementFlag, ImprovementType, StateAnswers, DEFAULT_RULESPEC_STR,
};
pub use error::{Result, TallyError};
pub use stats::{
    EventLog, ExplorationStatsView, FetchMode, LearnerEvent, LearnerEventType, StatsService,
    EVENT_SCHEMA_VERSION,
};
pub use storage::{
    AnswerStore, ExplorationStore, FileAnswerStore, FileExplorationStore, FileStatisticsStore,
    MemoryAnswerStore, MemoryExplorationStore, MemoryStatisticsStore, StatisticsStore,
};

// CLI commands
pub use cli::{
    AnswersCommand, EventCommand, ImprovementsCommand, RecordCommand, ResolveCommand,
    StatsCommand,
};
