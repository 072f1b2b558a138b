//! Event command for Tally.
//!
//! Appends one learner event to the event log.

use serde::Serialize;

use crate::stats::{EventLocation, LearnerEventType, StatsService};
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

/// Learner events that can be logged from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Hit,
    Leave,
    Complete,
}

/// Options for the event command.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Seconds spent so far (leave and complete events).
    pub time_spent_in_sec: Option<f64>,
}

/// Output format for the event command.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutput {
    pub success: bool,
    pub event: String,
    /// False when event logging is turned off.
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The event command implementation.
pub struct EventCommand<E, S, A> {
    service: StatsService<E, S, A>,
}

impl<E, S, A> EventCommand<E, S, A>
where
    E: ExplorationStore,
    S: StatisticsStore,
    A: AnswerStore,
{
    /// Create a new event command.
    pub fn new(service: StatsService<E, S, A>) -> Self {
        Self { service }
    }

    /// Run the event command.
    pub fn run(
        &self,
        kind: EventKind,
        at: EventLocation,
        session_id: &str,
        options: &EventOptions,
    ) -> EventOutput {
        let time_spent = options.time_spent_in_sec.unwrap_or(0.0);
        if time_spent < 0.0 {
            return EventOutput {
                success: false,
                event: String::new(),
                recorded: false,
                error: Some(format!(
                    "Expected time spent to be non-negative, received {}",
                    time_spent
                )),
            };
        }

        let data = match kind {
            EventKind::Start => LearnerEventType::start_exploration(at, session_id),
            EventKind::Hit => LearnerEventType::state_hit(at, session_id),
            EventKind::Leave => {
                LearnerEventType::maybe_leave_exploration(at, session_id, time_spent)
            }
            EventKind::Complete => {
                LearnerEventType::complete_exploration(at, session_id, time_spent)
            }
        };
        let event = data.event_name().to_string();

        match self.service.record_event(data) {
            Ok(recorded) => EventOutput {
                success: true,
                event,
                recorded,
                error: None,
            },
            Err(e) => EventOutput {
                success: false,
                event,
                recorded: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &EventOutput, options: &EventOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            super::to_json(output)
        } else if !output.success {
            format!(
                "Event failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            )
        } else if output.recorded {
            format!("Logged {} event.\n", output.event)
        } else {
            "Event logging is disabled; nothing was written.\n".to_string()
        }
    }
}
