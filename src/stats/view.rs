//! The exploration statistics report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Exploration, ExplorationStatistics, ImprovementFlag};

/// Entry counts for one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStatsEntry {
    pub name: String,
    pub first_entry_count: u64,
    pub total_entry_count: u64,
}

/// Everything the statistics page shows for one exploration version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationStatsView {
    pub improvements: Vec<ImprovementFlag>,
    pub last_updated: Option<DateTime<Utc>>,
    pub num_completions: u64,
    pub num_starts: u64,
    /// One entry per state, in declared order.
    pub state_stats: Vec<StateStatsEntry>,
    /// Versions that have batch statistics.
    pub versions: Vec<u32>,
}

impl ExplorationStatsView {
    /// Assemble the report. States the snapshot does not cover read as zero.
    pub fn build(
        exploration: &Exploration,
        statistics: &ExplorationStatistics,
        improvements: Vec<ImprovementFlag>,
        versions: Vec<u32>,
    ) -> Self {
        let state_stats = exploration
            .states
            .iter()
            .map(|state| {
                let counts = statistics.hit_counts(&state.name);
                StateStatsEntry {
                    name: state.name.clone(),
                    first_entry_count: counts.first_entry_count,
                    total_entry_count: counts.total_entry_count,
                }
            })
            .collect();

        Self {
            improvements,
            last_updated: statistics.last_updated,
            num_completions: statistics.complete_exploration_count,
            num_starts: statistics.start_exploration_count,
            state_stats,
            versions,
        }
    }

    /// Counts for one state, if it is part of the exploration.
    pub fn state(&self, name: &str) -> Option<&StateStatsEntry> {
        self.state_stats.iter().find(|s| s.name == name)
    }
}
