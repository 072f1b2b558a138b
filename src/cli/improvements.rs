//! Improvements command for Tally.
//!
//! Lists the states of an exploration version that need attention.

use serde::Serialize;

use crate::core::ImprovementFlag;
use crate::stats::{FetchMode, StatsService};
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

/// Options for the improvements command.
#[derive(Debug, Clone, Default)]
pub struct ImprovementsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Fail instead of assuming zero counts when statistics are unavailable.
    pub strict: bool,
}

impl ImprovementsOptions {
    pub fn fetch_mode(&self) -> FetchMode {
        if self.strict {
            FetchMode::Strict
        } else {
            FetchMode::BestEffort
        }
    }
}

/// Output format for the improvements command.
#[derive(Debug, Clone, Serialize)]
pub struct ImprovementsOutput {
    pub success: bool,
    pub exploration_id: String,
    pub exploration_version: u32,
    pub improvements: Vec<ImprovementFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The improvements command implementation.
pub struct ImprovementsCommand<E, S, A> {
    service: StatsService<E, S, A>,
}

impl<E, S, A> ImprovementsCommand<E, S, A>
where
    E: ExplorationStore,
    S: StatisticsStore,
    A: AnswerStore,
{
    /// Create a new improvements command.
    pub fn new(service: StatsService<E, S, A>) -> Self {
        Self { service }
    }

    /// Run the improvements command.
    pub fn run(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        options: &ImprovementsOptions,
    ) -> ImprovementsOutput {
        let result = self.service.state_improvements(
            exploration_id,
            exploration_version,
            options.fetch_mode(),
        );

        let (improvements, error) = match result {
            Ok(flags) => (flags, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        ImprovementsOutput {
            success: error.is_none(),
            exploration_id: exploration_id.to_string(),
            exploration_version,
            improvements,
            error,
        }
    }

    /// Format output based on options.
    pub fn format_output(
        &self,
        output: &ImprovementsOutput,
        options: &ImprovementsOptions,
    ) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            super::to_json(output)
        } else {
            format_flags(output)
        }
    }
}

fn format_flags(output: &ImprovementsOutput) -> String {
    if !output.success {
        return format!(
            "Improvements failed: {}\n",
            output.error.as_deref().unwrap_or("unknown error")
        );
    }

    if output.improvements.is_empty() {
        return format!(
            "No states of {} v{} need improvement.\n",
            output.exploration_id, output.exploration_version
        );
    }

    let mut lines = vec![format!(
        "States to improve in {} v{}:\n",
        output.exploration_id, output.exploration_version
    )];
    for flag in &output.improvements {
        lines.push(format!(
            "   {:>5}  {:<10}  {}",
            flag.rank,
            flag.improve_type.as_str(),
            flag.state_name
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}
