//! Answer validation and recording.
//!
//! Submissions arrive as loosely typed payloads. [`validate_submission`]
//! turns one into an [`AnswerRecord`], cropping oversized answers instead of
//! rejecting them. [`AnswerRecorder`] then appends the record to the state's
//! answer collection under the store's per-key lock.

use serde_json::Value;

use crate::config::AnswersConfig;
use crate::core::{
    AnswerRecord, AnswerSubmission, AnswerValue, StateAnswers, StateAnswersKey,
    SUBMIT_HANDLER_NAME,
};
use crate::error::{Result, TallyError};
use crate::storage::{AnswerStore, ExplorationStore};

/// Names of submission fields that are absent or `null`.
fn missing_fields(submission: &AnswerSubmission) -> Vec<&'static str> {
    let present = |v: &Option<Value>| v.as_ref().is_some_and(|v| !v.is_null());

    let mut missing = Vec::new();
    if !present(&submission.answer_value) {
        missing.push("answer_value");
    }
    if !present(&submission.time_spent_in_sec) {
        missing.push("time_spent_in_sec");
    }
    if !present(&submission.session_id) {
        missing.push("session_id");
    }
    missing
}

/// Largest prefix of `s` no longer than `max` bytes that ends on a char
/// boundary.
fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Shrink an answer that exceeds the configured size.
fn crop_answer(value: AnswerValue, config: &AnswersConfig) -> AnswerValue {
    let max = config.max_bytes_per_answer_value;
    if value.size_in_bytes() <= max {
        return value;
    }

    match value {
        AnswerValue::Text(text) => {
            let kept = truncate_at_char_boundary(&text, max);
            tracing::warn!(
                size = text.len(),
                max,
                "answer_value is too big to be stored: {} ...",
                kept
            );
            AnswerValue::Text(format!("{}{} ...", config.cropped_prefix, kept))
        }
        other => {
            tracing::warn!(
                size = other.size_in_bytes(),
                max,
                "answer_value is too big to be stored"
            );
            AnswerValue::Text(config.too_large_placeholder.clone())
        }
    }
}

/// Validate a submission and build the record to store.
///
/// Checks run in a fixed order and the first failure is returned. An
/// oversized answer is cropped, never rejected. The returned record has no
/// interaction id yet.
pub fn validate_submission(
    submission: &AnswerSubmission,
    config: &AnswersConfig,
) -> Result<AnswerRecord> {
    let missing = missing_fields(submission);
    if !missing.is_empty() {
        return Err(TallyError::validation(format!(
            "answer submission is missing required fields: {}",
            missing.join(", ")
        )));
    }

    let raw_answer = submission.answer_value.clone().unwrap_or(Value::Null);
    let answer_value = AnswerValue::from_json(raw_answer)
        .ok_or_else(|| TallyError::validation("answer_value must not be null"))?;
    let answer_value = crop_answer(answer_value, config);

    let session_id = match &submission.session_id {
        Some(Value::String(s)) => s.clone(),
        other => {
            return Err(TallyError::validation(format!(
                "Expected session_id to be a string, received {}",
                other.as_ref().unwrap_or(&Value::Null)
            )))
        }
    };

    let time_spent_in_sec = match submission.time_spent_in_sec.as_ref().and_then(Value::as_f64) {
        Some(t) => t,
        None => {
            return Err(TallyError::validation(format!(
                "Expected time_spent_in_sec to be a number, received {}",
                submission
                    .time_spent_in_sec
                    .as_ref()
                    .unwrap_or(&Value::Null)
            )))
        }
    };

    if time_spent_in_sec < 0.0 {
        return Err(TallyError::validation(format!(
            "Expected time_spent_in_sec to be non-negative, received {}",
            time_spent_in_sec
        )));
    }

    Ok(AnswerRecord {
        answer_value,
        time_spent_in_sec,
        rule_str: submission.rule_str.clone(),
        session_id,
        handler_name: SUBMIT_HANDLER_NAME.to_string(),
        interaction_id: None,
        params: submission.params.clone(),
    })
}

/// Appends validated answers to per-state answer collections.
pub struct AnswerRecorder<'a, E, A> {
    explorations: &'a E,
    answers: &'a A,
    config: &'a AnswersConfig,
}

impl<'a, E: ExplorationStore, A: AnswerStore> AnswerRecorder<'a, E, A> {
    pub fn new(explorations: &'a E, answers: &'a A, config: &'a AnswersConfig) -> Self {
        Self {
            explorations,
            answers,
            config,
        }
    }

    /// Interaction of `state_name` in the given exploration version, if both
    /// exist.
    fn lookup_interaction_id(&self, key: &StateAnswersKey) -> Result<Option<String>> {
        let exploration = self
            .explorations
            .get_exploration(&key.exploration_id, Some(key.exploration_version))?;
        Ok(exploration
            .as_ref()
            .and_then(|e| e.state(&key.state_name))
            .and_then(|s| s.interaction.id.clone()))
    }

    /// Validate `submission` and append it to the state's answers.
    ///
    /// Returns the stored record. Nothing is written when validation fails.
    pub fn record_answer(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        state_name: &str,
        submission: &AnswerSubmission,
    ) -> Result<AnswerRecord> {
        let mut record = validate_submission(submission, self.config)?;
        let key = StateAnswersKey::new(exploration_id, exploration_version, state_name);

        let updated = self.answers.upsert_state_answers(&key, &mut |existing| {
            let mut state_answers = match existing {
                Some(existing) => existing,
                None => StateAnswers::new(key.clone(), self.lookup_interaction_id(&key)?),
            };
            state_answers.append(record.clone());
            Ok(state_answers)
        })?;

        tracing::debug!(key = %key, answers = updated.len(), "recorded answer");

        record.interaction_id = updated.interaction_id().map(str::to_string);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Exploration, State};
    use crate::storage::{MemoryAnswerStore, MemoryExplorationStore};
    use serde_json::json;

    fn explorations() -> MemoryExplorationStore {
        let store = MemoryExplorationStore::new();
        store
            .insert(
                Exploration::new("eid", 1)
                    .with_state(State::self_looping("State 1", "TextInput"))
                    .with_state(State::self_looping("State 2", "NumericInput")),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_valid_submission() {
        let submission = AnswerSubmission::new("Equals(x)", "s1", 2.5, "x");
        let record = validate_submission(&submission, &AnswersConfig::default()).unwrap();

        assert_eq!(record.answer_value, AnswerValue::from("x"));
        assert_eq!(record.session_id, "s1");
        assert_eq!(record.time_spent_in_sec, 2.5);
        assert_eq!(record.rule_str, "Equals(x)");
        assert_eq!(record.handler_name, SUBMIT_HANDLER_NAME);
        assert!(record.interaction_id.is_none());
    }

    #[test]
    fn test_missing_fields_are_named() {
        let submission = AnswerSubmission {
            rule_str: "Default".to_string(),
            session_id: Some(Value::Null),
            time_spent_in_sec: None,
            answer_value: Some(json!("a")),
            ..Default::default()
        };

        let err = validate_submission(&submission, &AnswersConfig::default()).unwrap_err();
        assert!(err.is_validation());
        let message = err.to_string();
        assert!(message.contains("time_spent_in_sec"));
        assert!(message.contains("session_id"));
        assert!(!message.contains("answer_value"));
    }

    #[test]
    fn test_long_text_is_cropped() {
        let long = "a".repeat(1000);
        let submission = AnswerSubmission::new("Default", "s1", 1.0, long);
        let record = validate_submission(&submission, &AnswersConfig::default()).unwrap();

        let expected = format!("CROPPED: {} ...", "a".repeat(500));
        assert_eq!(record.answer_value, AnswerValue::Text(expected));
    }

    #[test]
    fn test_text_at_limit_is_kept() {
        let exact = "b".repeat(500);
        let submission = AnswerSubmission::new("Default", "s1", 1.0, exact.clone());
        let record = validate_submission(&submission, &AnswersConfig::default()).unwrap();
        assert_eq!(record.answer_value, AnswerValue::Text(exact));
    }

    #[test]
    fn test_crop_respects_char_boundaries() {
        let config = AnswersConfig {
            max_bytes_per_answer_value: 4,
            ..Default::default()
        };
        // "é" is two bytes, so byte 4 falls inside the third char
        let submission = AnswerSubmission::new("Default", "s1", 1.0, "ééé");
        let record = validate_submission(&submission, &config).unwrap();
        assert_eq!(record.answer_value, AnswerValue::from("CROPPED: éé ..."));

        let submission = AnswerSubmission::new("Default", "s1", 1.0, "aéé");
        let record = validate_submission(&submission, &config).unwrap();
        assert_eq!(record.answer_value, AnswerValue::from("CROPPED: aé ..."));
    }

    #[test]
    fn test_large_nonstring_uses_placeholder() {
        let big: Vec<u32> = (0..400).collect();
        let submission = AnswerSubmission::new("Default", "s1", 1.0, json!(big));
        let record = validate_submission(&submission, &AnswersConfig::default()).unwrap();
        assert_eq!(
            record.answer_value,
            AnswerValue::from("TOO LARGE NONSTRING")
        );
    }

    #[test]
    fn test_small_nonstring_is_kept() {
        let submission = AnswerSubmission::new("Default", "s1", 1.0, json!([1, 2, 3]));
        let record = validate_submission(&submission, &AnswersConfig::default()).unwrap();
        assert_eq!(
            record.answer_value,
            AnswerValue::Structured(json!([1, 2, 3]))
        );
    }

    #[test]
    fn test_session_id_must_be_string() {
        let mut submission = AnswerSubmission::new("Default", "s1", 1.0, "a");
        submission.session_id = Some(json!(7));

        let err = validate_submission(&submission, &AnswersConfig::default()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("session_id to be a string"));
    }

    #[test]
    fn test_time_spent_must_be_number() {
        let mut submission = AnswerSubmission::new("Default", "s1", 1.0, "a");
        submission.time_spent_in_sec = Some(json!("5"));

        let err = validate_submission(&submission, &AnswersConfig::default()).unwrap_err();
        assert!(err.to_string().contains("time_spent_in_sec to be a number"));
    }

    #[test]
    fn test_time_spent_must_be_non_negative() {
        let submission = AnswerSubmission::new("Default", "s1", -1.0, "a");

        let err = validate_submission(&submission, &AnswersConfig::default()).unwrap_err();
        assert!(err.to_string().contains("non-negative"));

        let zero = AnswerSubmission::new("Default", "s1", 0.0, "a");
        assert!(validate_submission(&zero, &AnswersConfig::default()).is_ok());
    }

    #[test]
    fn test_session_checked_before_time() {
        let mut submission = AnswerSubmission::new("Default", "s1", -1.0, "a");
        submission.session_id = Some(json!(false));

        let err = validate_submission(&submission, &AnswersConfig::default()).unwrap_err();
        assert!(err.to_string().contains("session_id"));
    }

    #[test]
    fn test_record_answer_sets_interaction_id() {
        let explorations = explorations();
        let answers = MemoryAnswerStore::new();
        let config = AnswersConfig::default();
        let recorder = AnswerRecorder::new(&explorations, &answers, &config);

        let params = [("name".to_string(), json!("Alice"))].into_iter().collect();
        let submission =
            AnswerSubmission::new("Default", "session1", 5.0, "answer1").with_params(params);
        let record = recorder
            .record_answer("eid", 1, "State 1", &submission)
            .unwrap();
        assert_eq!(record.interaction_id.as_deref(), Some("TextInput"));

        recorder
            .record_answer(
                "eid",
                1,
                "State 1",
                &AnswerSubmission::new("Default", "session2", 5.0, "answer1"),
            )
            .unwrap();

        let stored = answers
            .get_state_answers(&StateAnswersKey::new("eid", 1, "State 1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.interaction_id(), Some("TextInput"));
        assert_eq!(stored.answers()[0].params["name"], json!("Alice"));
        assert_eq!(stored.answers()[1].session_id, "session2");
    }

    #[test]
    fn test_record_answer_unknown_state_has_no_interaction() {
        let explorations = explorations();
        let answers = MemoryAnswerStore::new();
        let config = AnswersConfig::default();
        let recorder = AnswerRecorder::new(&explorations, &answers, &config);

        let record = recorder
            .record_answer(
                "eid",
                1,
                "Missing",
                &AnswerSubmission::new("Default", "s1", 1.0, "a"),
            )
            .unwrap();
        assert!(record.interaction_id.is_none());

        let record = recorder
            .record_answer(
                "other",
                4,
                "State 1",
                &AnswerSubmission::new("Default", "s1", 1.0, "a"),
            )
            .unwrap();
        assert!(record.interaction_id.is_none());
    }

    #[test]
    fn test_existing_collection_keeps_interaction_id() {
        let explorations = MemoryExplorationStore::new();
        let answers = MemoryAnswerStore::new();
        let config = AnswersConfig::default();
        let key = StateAnswersKey::new("eid", 1, "State 1");

        answers
            .upsert_state_answers(&key, &mut |_| {
                Ok(StateAnswers::new(key.clone(), Some("MultipleChoice".into())))
            })
            .unwrap();

        let recorder = AnswerRecorder::new(&explorations, &answers, &config);
        let record = recorder
            .record_answer(
                "eid",
                1,
                "State 1",
                &AnswerSubmission::new("Default", "s1", 1.0, "a"),
            )
            .unwrap();
        assert_eq!(record.interaction_id.as_deref(), Some("MultipleChoice"));
    }

    #[test]
    fn test_invalid_submission_writes_nothing() {
        let explorations = explorations();
        let answers = MemoryAnswerStore::new();
        let config = AnswersConfig::default();
        let recorder = AnswerRecorder::new(&explorations, &answers, &config);

        let result = recorder.record_answer(
            "eid",
            1,
            "State 1",
            &AnswerSubmission::new("Default", "s1", -3.0, "a"),
        );
        assert!(result.is_err());
        assert_eq!(answers.state_answers_len(), 0);
    }
}
