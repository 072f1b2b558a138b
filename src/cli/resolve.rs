//! Resolve command for Tally.
//!
//! Removes answers a creator has dealt with from a rule's answer log.

use serde::Serialize;

use crate::core::DEFAULT_RULESPEC_STR;
use crate::stats::StatsService;
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

/// Options for the resolve command.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Rule to resolve in (default rule when absent).
    pub rule: Option<String>,
}

/// Output format for the resolve command.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutput {
    pub success: bool,
    pub rule_str: String,
    /// Answers given on the command line.
    pub requested: usize,
    /// Answers that were present and removed.
    pub resolved: usize,
    /// Unresolved answers left in the log.
    pub remaining: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolveOutput {
    fn failure(rule_str: &str, requested: usize, error: impl Into<String>) -> Self {
        Self {
            success: false,
            rule_str: rule_str.to_string(),
            requested,
            resolved: 0,
            remaining: 0,
            error: Some(error.into()),
        }
    }
}

/// The resolve command implementation.
pub struct ResolveCommand<E, S, A> {
    service: StatsService<E, S, A>,
}

impl<E, S, A> ResolveCommand<E, S, A>
where
    E: ExplorationStore,
    S: StatisticsStore,
    A: AnswerStore,
{
    /// Create a new resolve command.
    pub fn new(service: StatsService<E, S, A>) -> Self {
        Self { service }
    }

    /// Run the resolve command.
    pub fn run(
        &self,
        exploration_id: &str,
        state_name: &str,
        answers: &[String],
        options: &ResolveOptions,
    ) -> ResolveOutput {
        let rule_str = options.rule.as_deref().unwrap_or(DEFAULT_RULESPEC_STR);

        let resolved =
            match self
                .service
                .resolve_answers(exploration_id, state_name, rule_str, answers)
            {
                Ok(n) => n,
                Err(e) => return ResolveOutput::failure(rule_str, answers.len(), e.to_string()),
            };

        let remaining = match self.service.answer_log(exploration_id, state_name, rule_str) {
            Ok(log) => log.total_answer_count(),
            Err(e) => return ResolveOutput::failure(rule_str, answers.len(), e.to_string()),
        };

        ResolveOutput {
            success: true,
            rule_str: rule_str.to_string(),
            requested: answers.len(),
            resolved,
            remaining,
            error: None,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ResolveOutput, options: &ResolveOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            super::to_json(output)
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &ResolveOutput) -> String {
        if !output.success {
            return format!(
                "Resolve failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        format!(
            "Resolved {} of {} answer(s) in {}. {} unresolved answer(s) remain.\n",
            output.resolved, output.requested, output.rule_str, output.remaining
        )
    }
}
