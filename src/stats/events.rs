//! Learner event types and the JSONL event log.
//!
//! Raw learner interactions are appended to `events.log` in the data
//! directory, one JSON object per line. The batch aggregator consumes this
//! stream to recompute hit counts.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

/// Schema version for learner events.
///
/// Increment when the event schema changes in a breaking way.
pub const EVENT_SCHEMA_VERSION: u8 = 1;

/// One line of the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearnerEvent {
    /// Schema version for forward compatibility.
    pub v: u8,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: LearnerEventType,
}

impl LearnerEvent {
    /// Create an event stamped with the current time.
    pub fn new(data: LearnerEventType) -> Self {
        Self::with_timestamp(data, Utc::now())
    }

    /// Create an event with a specific timestamp (for testing).
    pub fn with_timestamp(data: LearnerEventType, ts: DateTime<Utc>) -> Self {
        Self {
            v: EVENT_SCHEMA_VERSION,
            ts,
            data,
        }
    }
}

/// The kind of learner event and its data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LearnerEventType {
    /// A learner opened an exploration.
    StartExploration {
        exploration_id: String,
        exploration_version: u32,
        state_name: String,
        session_id: String,
    },

    /// A learner entered a state.
    StateHit {
        exploration_id: String,
        exploration_version: u32,
        state_name: String,
        session_id: String,
    },

    /// A learner may have left without finishing.
    MaybeLeaveExploration {
        exploration_id: String,
        exploration_version: u32,
        state_name: String,
        session_id: String,
        time_spent_in_sec: f64,
    },

    /// A learner reached a terminal state.
    CompleteExploration {
        exploration_id: String,
        exploration_version: u32,
        state_name: String,
        session_id: String,
        time_spent_in_sec: f64,
    },

    /// An answer was recorded.
    AnswerSubmitted {
        exploration_id: String,
        exploration_version: u32,
        state_name: String,
        session_id: String,
        rule_str: String,
        /// Normalized answer as counted in the answer log.
        answer: String,
    },

    /// A creator resolved answers from a rule's log.
    AnswersResolved {
        exploration_id: String,
        state_name: String,
        rule_str: String,
        /// How many of the given answers were present.
        resolved: usize,
    },
}

/// Where in an exploration an event happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLocation {
    pub exploration_id: String,
    pub exploration_version: u32,
    pub state_name: String,
}

impl EventLocation {
    pub fn new(
        exploration_id: impl Into<String>,
        exploration_version: u32,
        state_name: impl Into<String>,
    ) -> Self {
        Self {
            exploration_id: exploration_id.into(),
            exploration_version,
            state_name: state_name.into(),
        }
    }
}

impl LearnerEventType {
    /// Create a start event.
    pub fn start_exploration(at: EventLocation, session_id: impl Into<String>) -> Self {
        Self::StartExploration {
            exploration_id: at.exploration_id,
            exploration_version: at.exploration_version,
            state_name: at.state_name,
            session_id: session_id.into(),
        }
    }

    /// Create a state hit event.
    pub fn state_hit(at: EventLocation, session_id: impl Into<String>) -> Self {
        Self::StateHit {
            exploration_id: at.exploration_id,
            exploration_version: at.exploration_version,
            state_name: at.state_name,
            session_id: session_id.into(),
        }
    }

    /// Create a maybe-leave event.
    pub fn maybe_leave_exploration(
        at: EventLocation,
        session_id: impl Into<String>,
        time_spent_in_sec: f64,
    ) -> Self {
        Self::MaybeLeaveExploration {
            exploration_id: at.exploration_id,
            exploration_version: at.exploration_version,
            state_name: at.state_name,
            session_id: session_id.into(),
            time_spent_in_sec,
        }
    }

    /// Create a completion event.
    pub fn complete_exploration(
        at: EventLocation,
        session_id: impl Into<String>,
        time_spent_in_sec: f64,
    ) -> Self {
        Self::CompleteExploration {
            exploration_id: at.exploration_id,
            exploration_version: at.exploration_version,
            state_name: at.state_name,
            session_id: session_id.into(),
            time_spent_in_sec,
        }
    }

    /// Create an answer event.
    pub fn answer_submitted(
        at: EventLocation,
        session_id: impl Into<String>,
        rule_str: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self::AnswerSubmitted {
            exploration_id: at.exploration_id,
            exploration_version: at.exploration_version,
            state_name: at.state_name,
            session_id: session_id.into(),
            rule_str: rule_str.into(),
            answer: answer.into(),
        }
    }

    /// Create a resolution event.
    pub fn answers_resolved(
        exploration_id: impl Into<String>,
        state_name: impl Into<String>,
        rule_str: impl Into<String>,
        resolved: usize,
    ) -> Self {
        Self::AnswersResolved {
            exploration_id: exploration_id.into(),
            state_name: state_name.into(),
            rule_str: rule_str.into(),
            resolved,
        }
    }

    /// Get the event name as a string.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StartExploration { .. } => "start_exploration",
            Self::StateHit { .. } => "state_hit",
            Self::MaybeLeaveExploration { .. } => "maybe_leave_exploration",
            Self::CompleteExploration { .. } => "complete_exploration",
            Self::AnswerSubmitted { .. } => "answer_submitted",
            Self::AnswersResolved { .. } => "answers_resolved",
        }
    }
}

/// Append-only JSONL writer for learner events.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Create an event log at the given path. Nothing is written until the
    /// first append.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append an event to the log.
    pub fn append(&self, event: &LearnerEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| TallyError::storage(parent, e))?;
        }

        let json = serde_json::to_string(event)
            .map_err(|e| TallyError::serde(format!("Failed to serialize learner event: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TallyError::storage(&self.path, e))?;

        writeln!(file, "{}", json).map_err(|e| TallyError::storage(&self.path, e))?;

        tracing::debug!(event = event.data.event_name(), "appended learner event");
        Ok(())
    }

    /// Append an event of the given kind stamped with the current time.
    pub fn append_event(&self, data: LearnerEventType) -> Result<()> {
        self.append(&LearnerEvent::new(data))
    }

    /// Read all events from the log.
    pub fn read_all(&self) -> Result<Vec<LearnerEvent>> {
        let Some(reader) = self.open_reader()? else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| TallyError::storage(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }

            let event: LearnerEvent = serde_json::from_str(&line).map_err(|e| {
                TallyError::serde(format!(
                    "Failed to parse learner event on line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Count the events in the log.
    pub fn count(&self) -> Result<usize> {
        let Some(reader) = self.open_reader()? else {
            return Ok(0);
        };

        let mut count = 0;
        for line in reader.lines() {
            let line = line.map_err(|e| TallyError::storage(&self.path, e))?;
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn open_reader(&self) -> Result<Option<BufReader<File>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path).map_err(|e| TallyError::storage(&self.path, e))?;
        Ok(Some(BufReader::new(file)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
