//! Core types and logic for Tally.
//!
//! This module contains the domain types shared by the recorder, the
//! ranking and the report: answer logs, answer records, the exploration
//! boundary model and the batch statistics snapshot.

pub mod answer;
pub mod answer_log;
pub mod exploration;
pub mod improvements;
pub mod statistics;

pub use answer::{
    AnswerRecord, AnswerSubmission, AnswerValue, StateAnswers, StateAnswersKey,
    SUBMIT_HANDLER_NAME,
};
pub use answer_log::{AnswerCount, AnswerLog, AnswerLogKey};
pub use exploration::{
    AnswerGroup, Exploration, Interaction, Outcome, RuleSpec, State, DEFAULT_RULESPEC_STR,
};
pub use improvements::{rank_states, ImprovementFlag, ImprovementType, RankingPolicy, TieBreak};
pub use statistics::{ExplorationStatistics, StateHitCounts};
