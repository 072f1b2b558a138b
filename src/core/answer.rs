//! Answer records and the per-state answer collections they are appended to.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Handler name stamped on every recorded answer.
pub const SUBMIT_HANDLER_NAME: &str = "submit";

/// Size charged for a [`AnswerValue::Number`].
const NUMBER_SIZE: usize = 8;

/// Size charged for a [`AnswerValue::Boolean`].
const BOOLEAN_SIZE: usize = 1;

/// A learner's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    /// Lists, maps and anything else an interaction submits.
    Structured(Value),
}

impl AnswerValue {
    /// Convert a raw JSON payload. `null` carries no answer.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::Text(s)),
            Value::Bool(b) => Some(Self::Boolean(b)),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Some(Self::Number(f)),
                None => Some(Self::Structured(Value::Number(n))),
            },
            other => Some(Self::Structured(other)),
        }
    }

    /// Bytes this value accounts for against the per-answer cap.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Number(_) => NUMBER_SIZE,
            Self::Boolean(_) => BOOLEAN_SIZE,
            Self::Structured(v) => serde_json::to_string(v).map(|s| s.len()).unwrap_or(0),
        }
    }

    /// The key this answer is counted under in an answer log.
    pub fn log_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Structured(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// An answer submission as it arrives from an event payload.
///
/// Fields are loosely typed JSON so that malformed payloads can be rejected
/// with a precise reason by the recorder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    /// The rule the answer was classified under.
    #[serde(default)]
    pub rule_str: String,
    #[serde(default)]
    pub session_id: Option<Value>,
    #[serde(default)]
    pub time_spent_in_sec: Option<Value>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub answer_value: Option<Value>,
}

impl AnswerSubmission {
    /// Build a well-typed submission.
    pub fn new(
        rule_str: impl Into<String>,
        session_id: impl Into<String>,
        time_spent_in_sec: f64,
        answer_value: impl Into<Value>,
    ) -> Self {
        Self {
            rule_str: rule_str.into(),
            session_id: Some(Value::String(session_id.into())),
            time_spent_in_sec: Some(Value::from(time_spent_in_sec)),
            params: BTreeMap::new(),
            answer_value: Some(answer_value.into()),
        }
    }

    /// Attach the learner's parameter snapshot.
    pub fn with_params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.params = params;
        self
    }
}

/// One validated learner submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub answer_value: AnswerValue,
    pub time_spent_in_sec: f64,
    pub rule_str: String,
    pub session_id: String,
    pub handler_name: String,
    /// Interaction of the state when the answer was recorded.
    pub interaction_id: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

/// Identifies the answer collection of one state in one exploration version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateAnswersKey {
    pub exploration_id: String,
    pub exploration_version: u32,
    pub state_name: String,
}

impl StateAnswersKey {
    /// Create a new key.
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

impl fmt::Display for StateAnswersKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@v{}/{}",
            self.exploration_id, self.exploration_version, self.state_name
        )
    }
}

/// Every answer recorded for one state of one exploration version.
///
/// The interaction id is fixed when the collection is created; an edit that
/// changes the interaction produces a new exploration version and therefore
/// a new collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateAnswers {
    key: StateAnswersKey,
    interaction_id: Option<String>,
    answers: Vec<AnswerRecord>,
}

impl StateAnswers {
    /// Create an empty collection bound to `interaction_id`.
    pub fn new(key: StateAnswersKey, interaction_id: Option<String>) -> Self {
        Self {
            key,
            interaction_id,
            answers: Vec::new(),
        }
    }

    /// Append a record. Its interaction id is overwritten with this
    /// collection's.
    pub fn append(&mut self, mut record: AnswerRecord) {
        record.interaction_id = self.interaction_id.clone();
        self.answers.push(record);
    }

    pub fn key(&self) -> &StateAnswersKey {
        &self.key
    }

    pub fn interaction_id(&self) -> Option<&str> {
        self.interaction_id.as_deref()
    }

    /// Records in arrival order.
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}
