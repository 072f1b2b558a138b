//! State improvement ranking.
//!
//! A state is flagged when, relative to how often it was entered, learners
//! either kept hitting a default outcome that loops back to the same state
//! (`default`) or left without answering (`incomplete`).
//!
//! For each entered state:
//! - threshold = `threshold_ratio` x total entries (strictly exceeded)
//! - default candidate rank = default-rule answer count
//! - incomplete candidate rank = no-answer count
//!
//! The higher-ranked candidate wins; flags are then ordered by rank,
//! highest first, keeping declared state order among equal ranks.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{AnswerLog, Exploration, ExplorationStatistics};

/// Ranking defaults.
pub mod defaults {
    /// Fraction of entries a signal must exceed to flag a state.
    pub const THRESHOLD_RATIO: f64 = 0.2;
}

/// Why a state needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementType {
    /// Learners are stuck on a self-looping default outcome.
    Default,
    /// Learners leave without submitting an answer.
    Incomplete,
}

impl ImprovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Incomplete => "incomplete",
        }
    }
}

/// A suggestion to improve one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementFlag {
    pub rank: u64,
    pub state_name: String,
    #[serde(rename = "type")]
    pub improve_type: ImprovementType,
}

impl ImprovementFlag {
    pub fn new(rank: u64, state_name: impl Into<String>, improve_type: ImprovementType) -> Self {
        Self {
            rank,
            state_name: state_name.into(),
            improve_type,
        }
    }
}

/// Which flag wins when both candidates of a state have the same rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    Default,
    Incomplete,
}

impl TieBreak {
    /// Parse a config value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "default" => Some(Self::Default),
            "incomplete" => Some(Self::Incomplete),
            _ => None,
        }
    }

    fn preferred(&self) -> ImprovementType {
        match self {
            Self::Default => ImprovementType::Default,
            Self::Incomplete => ImprovementType::Incomplete,
        }
    }
}

/// Tunables for [`rank_states`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingPolicy {
    pub threshold_ratio: f64,
    pub tie_break: TieBreak,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            threshold_ratio: defaults::THRESHOLD_RATIO,
            tie_break: TieBreak::Default,
        }
    }
}

/// Rank the states of `exploration` that need improvement.
///
/// `default_rule_logs` pairs state names with their default-rule answer
/// log; states without an entry count as having no default-rule answers.
/// A missing snapshot counts as no entries, which yields no flags.
pub fn rank_states(
    exploration: &Exploration,
    statistics: Option<&ExplorationStatistics>,
    default_rule_logs: &[(String, AnswerLog)],
    policy: &RankingPolicy,
) -> Vec<ImprovementFlag> {
    let Some(statistics) = statistics else {
        return Vec::new();
    };

    let default_counts: HashMap<&str, u64> = default_rule_logs
        .iter()
        .map(|(name, log)| (name.as_str(), log.total_answer_count()))
        .collect();

    let mut flags: Vec<ImprovementFlag> = exploration
        .states
        .iter()
        .filter_map(|state| {
            let counts = statistics.hit_counts(&state.name);
            if counts.total_entry_count == 0 {
                return None;
            }

            let threshold = policy.threshold_ratio * counts.total_entry_count as f64;
            let default_count = default_counts.get(state.name.as_str()).copied().unwrap_or(0);

            let default_candidate = (default_count as f64 > threshold
                && state.default_outcome_is_self_loop())
            .then_some(default_count);
            let incomplete_candidate =
                (counts.no_answer_count as f64 > threshold).then_some(counts.no_answer_count);

            let (rank, improve_type) = match (default_candidate, incomplete_candidate) {
                (Some(d), Some(i)) if d > i => (d, ImprovementType::Default),
                (Some(d), Some(i)) if i > d => (i, ImprovementType::Incomplete),
                (Some(d), Some(_)) => (d, policy.tie_break.preferred()),
                (Some(d), None) => (d, ImprovementType::Default),
                (None, Some(i)) => (i, ImprovementType::Incomplete),
                (None, None) => return None,
            };

            Some(ImprovementFlag::new(rank, state.name.clone(), improve_type))
        })
        .filter(|flag| flag.rank != 0)
        .collect();

    // Stable: equal ranks keep declared state order
    flags.sort_by(|a, b| b.rank.cmp(&a.rank));

    tracing::debug!(
        exploration_id = %exploration.id,
        flagged = flags.len(),
        "ranked state improvements"
    );

    flags
}
