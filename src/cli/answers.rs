//! Answers command for Tally.
//!
//! Shows what learners answered in one state: the most common answers no
//! rule matched, per-rule answer counts, and optionally how many records a
//! version has stored.

use serde::Serialize;

use crate::stats::{RuleStats, StatsService};
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

/// Options for the answers command.
#[derive(Debug, Clone, Default)]
pub struct AnswersOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Also count the records stored for this exploration version.
    pub version: Option<u32>,
}

/// An answer and how often it was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerCountInfo {
    pub answer: String,
    pub count: u64,
}

impl From<(String, u64)> for AnswerCountInfo {
    fn from((answer, count): (String, u64)) -> Self {
        Self { answer, count }
    }
}

/// Output format for the answers command.
#[derive(Debug, Clone, Serialize)]
pub struct AnswersOutput {
    pub success: bool,
    pub state_name: String,
    /// Top unresolved answers of the default rule.
    pub top_unresolved: Vec<AnswerCountInfo>,
    pub rules: Vec<RuleStats>,
    /// Records stored for the requested version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_answers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnswersOutput {
    fn failure(state_name: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            state_name: state_name.to_string(),
            top_unresolved: Vec::new(),
            rules: Vec::new(),
            stored_answers: None,
            error: Some(error.into()),
        }
    }
}

/// The answers command implementation.
pub struct AnswersCommand<E, S, A> {
    service: StatsService<E, S, A>,
}

impl<E, S, A> AnswersCommand<E, S, A>
where
    E: ExplorationStore,
    S: StatisticsStore,
    A: AnswerStore,
{
    /// Create a new answers command.
    pub fn new(service: StatsService<E, S, A>) -> Self {
        Self { service }
    }

    /// Run the answers command.
    pub fn run(
        &self,
        exploration_id: &str,
        state_name: &str,
        options: &AnswersOptions,
    ) -> AnswersOutput {
        let top_unresolved = match self
            .service
            .top_unresolved_answers_for_default_rule(exploration_id, state_name)
        {
            Ok(top) => top.into_iter().map(AnswerCountInfo::from).collect(),
            Err(e) => return AnswersOutput::failure(state_name, e.to_string()),
        };

        let rules = match self.service.state_rules_stats(exploration_id, state_name) {
            Ok(rules) => rules,
            Err(e) => return AnswersOutput::failure(state_name, e.to_string()),
        };

        let stored_answers = match options.version {
            Some(version) => {
                match self
                    .service
                    .state_answers(exploration_id, version, state_name)
                {
                    Ok(answers) => Some(answers.map(|a| a.len()).unwrap_or(0)),
                    Err(e) => return AnswersOutput::failure(state_name, e.to_string()),
                }
            }
            None => None,
        };

        AnswersOutput {
            success: true,
            state_name: state_name.to_string(),
            top_unresolved,
            rules,
            stored_answers,
            error: None,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &AnswersOutput, options: &AnswersOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            super::to_json(output)
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &AnswersOutput) -> String {
        if !output.success {
            return format!(
                "Answers failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = vec![format!("=== Answers for {} ===\n", output.state_name)];

        if let Some(stored) = output.stored_answers {
            lines.push(format!("Stored records: {}\n", stored));
        }

        lines.push("Top unresolved (default rule)".to_string());
        if output.top_unresolved.is_empty() {
            lines.push("   (none)".to_string());
        }
        for entry in &output.top_unresolved {
            lines.push(format!("   {:>5}  {}", entry.count, entry.answer));
        }
        lines.push(String::new());

        if !output.rules.is_empty() {
            lines.push("Rules".to_string());
            for rule in &output.rules {
                lines.push(format!("   {} ({} hits)", rule.key, rule.rule_hits));
                for (answer, count) in &rule.answers {
                    lines.push(format!("      {:>5}  {}", count, answer));
                }
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}
