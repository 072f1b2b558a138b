//! Stats command for Tally.
//!
//! Displays the statistics report for one exploration version.

use serde::Serialize;

use crate::stats::{ExplorationStatsView, FetchMode, StatsService};
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

/// Options for the stats command.
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Fail instead of assuming zero counts when statistics are unavailable.
    pub strict: bool,
}

/// Output format for the stats command.
#[derive(Debug, Clone, Serialize)]
pub struct StatsOutput {
    pub success: bool,
    pub exploration_id: String,
    pub exploration_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ExplorationStatsView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The stats command implementation.
pub struct StatsCommand<E, S, A> {
    service: StatsService<E, S, A>,
}

impl<E, S, A> StatsCommand<E, S, A>
where
    E: ExplorationStore,
    S: StatisticsStore,
    A: AnswerStore,
{
    /// Create a new stats command.
    pub fn new(service: StatsService<E, S, A>) -> Self {
        Self { service }
    }

    /// Run the stats command.
    pub fn run(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        options: &StatsOptions,
    ) -> StatsOutput {
        let mode = if options.strict {
            FetchMode::Strict
        } else {
            FetchMode::BestEffort
        };

        let (stats, error) =
            match self
                .service
                .exploration_stats(exploration_id, exploration_version, mode)
            {
                Ok(view) => (Some(view), None),
                Err(e) => (None, Some(e.to_string())),
            };

        StatsOutput {
            success: error.is_none(),
            exploration_id: exploration_id.to_string(),
            exploration_version,
            stats,
            error,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatsOutput, options: &StatsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            super::to_json(output)
        } else {
            self.format_human_readable(output)
        }
    }

    /// Format output as human-readable text.
    fn format_human_readable(&self, output: &StatsOutput) -> String {
        let Some(view) = output.stats.as_ref().filter(|_| output.success) else {
            return format!(
                "Stats failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        };

        let mut lines = vec![format!(
            "=== {} v{} ===\n",
            output.exploration_id, output.exploration_version
        )];

        let updated = view
            .last_updated
            .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!(
            "Starts: {} | Completions: {} | Updated: {}",
            view.num_starts, view.num_completions, updated
        ));
        if !view.versions.is_empty() {
            let versions: Vec<String> = view.versions.iter().map(|v| v.to_string()).collect();
            lines.push(format!("Versions with statistics: {}", versions.join(", ")));
        }
        lines.push(String::new());

        lines.push("States".to_string());
        for state in &view.state_stats {
            lines.push(format!(
                "   {:<24} first: {:>5}  total: {:>5}",
                state.name, state.first_entry_count, state.total_entry_count
            ));
        }
        lines.push(String::new());

        if !view.improvements.is_empty() {
            lines.push("Needs improvement".to_string());
            for flag in &view.improvements {
                lines.push(format!(
                    "   {} ({}, rank {})",
                    flag.state_name,
                    flag.improve_type.as_str(),
                    flag.rank
                ));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::test_support::service;

    #[test]
    fn test_stats_report() {
        let cmd = StatsCommand::new(service());
        let output = cmd.run("eid", 1, &StatsOptions::default());

        assert!(output.success);
        let view = output.stats.as_ref().unwrap();
        assert_eq!(view.num_starts, 10);
        assert_eq!(view.num_completions, 6);
        assert_eq!(view.versions, vec![1]);
        assert_eq!(view.state_stats.len(), 2);

        let text = cmd.format_output(&output, &StatsOptions::default());
        assert!(text.contains("Starts: 10 | Completions: 6 | Updated: never"));
        assert!(text.contains("Q (incomplete, rank 3)"));
    }

    #[test]
    fn test_stats_json() {
        let cmd = StatsCommand::new(service());
        let options = StatsOptions {
            json: true,
            ..Default::default()
        };
        let text = cmd.format_output(&cmd.run("eid", 1, &options), &options);

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["stats"]["num_starts"], 10);
        assert_eq!(parsed["stats"]["state_stats"][0]["name"], "Q");
        assert_eq!(parsed["stats"]["state_stats"][1]["total_entry_count"], 0);
    }

    #[test]
    fn test_stats_quiet() {
        let cmd = StatsCommand::new(service());
        let options = StatsOptions {
            quiet: true,
            ..Default::default()
        };
        assert!(cmd
            .format_output(&cmd.run("eid", 1, &options), &options)
            .is_empty());
    }
}
