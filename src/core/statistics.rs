//! Batch statistics snapshot.
//!
//! The aggregation job runs outside Tally and publishes one snapshot per
//! exploration version. A snapshot may be stale, and a state the job has not
//! seen yet is simply absent; every count then reads as zero.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hit counts for one state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateHitCounts {
    /// Sessions that entered the state at least once.
    pub first_entry_count: u64,
    /// All entries, including repeat visits.
    pub total_entry_count: u64,
    /// Entries after which the learner left without answering.
    pub no_answer_count: u64,
}

/// Aggregated statistics for one exploration version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationStatistics {
    pub last_updated: Option<DateTime<Utc>>,
    pub complete_exploration_count: u64,
    pub start_exploration_count: u64,
    pub state_hit_counts: HashMap<String, StateHitCounts>,
}

impl ExplorationStatistics {
    /// Counts for `state_name`, zeroed when the job has not seen it.
    pub fn hit_counts(&self, state_name: &str) -> StateHitCounts {
        self.state_hit_counts
            .get(state_name)
            .copied()
            .unwrap_or_default()
    }

    /// Set the counts for one state.
    pub fn with_state(mut self, state_name: impl Into<String>, counts: StateHitCounts) -> Self {
        self.state_hit_counts.insert(state_name.into(), counts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_reads_zero() {
        let stats = ExplorationStatistics::default();
        assert_eq!(stats.hit_counts("Intro"), StateHitCounts::default());
    }

    #[test]
    fn test_with_state() {
        let counts = StateHitCounts {
            first_entry_count: 3,
            total_entry_count: 5,
            no_answer_count: 1,
        };
        let stats = ExplorationStatistics::default().with_state("Intro", counts);
        assert_eq!(stats.hit_counts("Intro"), counts);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "start_exploration_count": 4,
            "state_hit_counts": {"Intro": {"total_entry_count": 5}}
        }"#;

        let stats: ExplorationStatistics = serde_json::from_str(json).unwrap();
        assert_eq!(stats.start_exploration_count, 4);
        assert_eq!(stats.complete_exploration_count, 0);
        assert!(stats.last_updated.is_none());

        let intro = stats.hit_counts("Intro");
        assert_eq!(intro.total_entry_count, 5);
        assert_eq!(intro.no_answer_count, 0);
    }
}
