//! Record command for Tally.
//!
//! Validates one learner answer, appends it to the state's answers and
//! counts it in the rule's answer log.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::core::AnswerSubmission;
use crate::stats::StatsService;
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

/// Options for the record command.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// One answer as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RecordInput {
    pub exploration_id: String,
    pub exploration_version: u32,
    pub state_name: String,
    pub rule_str: String,
    pub session_id: String,
    pub time_spent_in_sec: f64,
    /// `name=value` pairs.
    pub params: Vec<String>,
    /// The answer as JSON; anything that does not parse is taken as text.
    pub answer: String,
}

/// Output format for the record command.
#[derive(Debug, Clone, Serialize)]
pub struct RecordOutput {
    pub success: bool,
    /// The submission itself was rejected.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub invalid: bool,
    pub exploration_id: String,
    pub exploration_version: u32,
    pub state_name: String,
    pub rule_str: String,
    /// Answer as counted in the rule's log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordOutput {
    fn for_input(input: &RecordInput) -> Self {
        Self {
            success: false,
            invalid: false,
            exploration_id: input.exploration_id.clone(),
            exploration_version: input.exploration_version,
            state_name: input.state_name.clone(),
            rule_str: input.rule_str.clone(),
            answer: None,
            interaction_id: None,
            error: None,
        }
    }

    fn failure(input: &RecordInput, invalid: bool, error: impl Into<String>) -> Self {
        Self {
            invalid,
            error: Some(error.into()),
            ..Self::for_input(input)
        }
    }
}

/// Parse a JSON value, falling back to a plain string.
pub fn parse_json_or_text(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse `name=value` parameter pairs.
pub fn parse_params(pairs: &[String]) -> Result<BTreeMap<String, Value>, String> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                Ok((name.to_string(), parse_json_or_text(value)))
            }
            _ => Err(format!("Invalid parameter '{}': expected name=value", pair)),
        })
        .collect()
}

/// The record command implementation.
pub struct RecordCommand<E, S, A> {
    service: StatsService<E, S, A>,
}

impl<E, S, A> RecordCommand<E, S, A>
where
    E: ExplorationStore,
    S: StatisticsStore,
    A: AnswerStore,
{
    /// Create a new record command.
    pub fn new(service: StatsService<E, S, A>) -> Self {
        Self { service }
    }

    /// Run the record command.
    pub fn run(&self, input: &RecordInput, _options: &RecordOptions) -> RecordOutput {
        let params = match parse_params(&input.params) {
            Ok(params) => params,
            Err(e) => return RecordOutput::failure(input, true, e),
        };

        let submission = AnswerSubmission::new(
            input.rule_str.as_str(),
            input.session_id.as_str(),
            input.time_spent_in_sec,
            parse_json_or_text(&input.answer),
        )
        .with_params(params);

        match self.service.submit_answer(
            &input.exploration_id,
            input.exploration_version,
            &input.state_name,
            &submission,
        ) {
            Ok(record) => RecordOutput {
                success: true,
                answer: Some(record.answer_value.log_key()),
                interaction_id: record.interaction_id,
                ..RecordOutput::for_input(input)
            },
            Err(e) => RecordOutput::failure(input, e.is_validation(), e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &RecordOutput, options: &RecordOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            super::to_json(output)
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &RecordOutput) -> String {
        if !output.success {
            return format!(
                "Record failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        format!(
            "Recorded answer for {} v{} / {} under {}.\nAnswer: {}\n",
            output.exploration_id,
            output.exploration_version,
            output.state_name,
            output.rule_str,
            output.answer.as_deref().unwrap_or("")
        )
    }
}
