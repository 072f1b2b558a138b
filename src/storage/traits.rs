//! Storage traits for Tally.
//!
//! Tally reads explorations and batch statistics that other systems own,
//! and keeps its own answer collections and answer logs. Each concern is a
//! trait so the service can run against memory or file backends.

use std::sync::Arc;

use crate::core::{
    AnswerLog, AnswerLogKey, Exploration, ExplorationStatistics, StateAnswers, StateAnswersKey,
};
use crate::error::Result;

/// Read access to exploration definitions.
pub trait ExplorationStore: Send + Sync {
    /// Fetch an exploration at `version`, or the latest version for `None`.
    ///
    /// Returns `Ok(None)` if it doesn't exist.
    fn get_exploration(&self, id: &str, version: Option<u32>) -> Result<Option<Exploration>>;
}

/// Read access to the batch aggregator's published snapshots.
pub trait StatisticsStore: Send + Sync {
    /// Fetch the snapshot for one exploration version.
    ///
    /// Returns `Ok(None)` if the job has not produced one yet.
    fn get_statistics(
        &self,
        exploration_id: &str,
        version: u32,
    ) -> Result<Option<ExplorationStatistics>>;

    /// Versions that have a snapshot, ascending.
    fn list_versions(&self, exploration_id: &str) -> Result<Vec<u32>>;
}

/// Closure run against the current answer collection (if any) to produce
/// the collection to persist.
pub type StateAnswersUpdate<'a> =
    dyn FnMut(Option<StateAnswers>) -> Result<StateAnswers> + 'a;

/// Persistence for answer collections and answer logs.
///
/// Both update methods are atomic per key: implementations hold their write
/// lock for the whole read-modify-write, so concurrent updates of one key
/// never lose each other.
pub trait AnswerStore: Send + Sync {
    /// Retrieve the answer collection for a key.
    fn get_state_answers(&self, key: &StateAnswersKey) -> Result<Option<StateAnswers>>;

    /// Create or replace the answer collection for a key.
    ///
    /// If `update` fails nothing is written and its error is returned.
    fn upsert_state_answers(
        &self,
        key: &StateAnswersKey,
        update: &mut StateAnswersUpdate<'_>,
    ) -> Result<StateAnswers>;

    /// Fetch several answer logs at once, in the order of `keys`.
    ///
    /// Keys without a log yield an empty log.
    fn get_answer_logs(&self, keys: &[AnswerLogKey]) -> Result<Vec<AnswerLog>>;

    /// Mutate one answer log, creating it if needed.
    fn update_answer_log(
        &self,
        key: &AnswerLogKey,
        update: &mut dyn FnMut(&mut AnswerLog),
    ) -> Result<AnswerLog>;

    /// Fetch one answer log.
    fn get_answer_log(&self, key: &AnswerLogKey) -> Result<AnswerLog> {
        Ok(self
            .get_answer_logs(std::slice::from_ref(key))?
            .pop()
            .unwrap_or_default())
    }
}

/// Blanket implementations for Arc-wrapped stores.
///
/// This allows sharing one store between a service and the threads or tests
/// that drive it.
impl<T: ExplorationStore + ?Sized> ExplorationStore for Arc<T> {
    fn get_exploration(&self, id: &str, version: Option<u32>) -> Result<Option<Exploration>> {
        (**self).get_exploration(id, version)
    }
}

impl<T: StatisticsStore + ?Sized> StatisticsStore for Arc<T> {
    fn get_statistics(
        &self,
        exploration_id: &str,
        version: u32,
    ) -> Result<Option<ExplorationStatistics>> {
        (**self).get_statistics(exploration_id, version)
    }

    fn list_versions(&self, exploration_id: &str) -> Result<Vec<u32>> {
        (**self).list_versions(exploration_id)
    }
}

impl<T: AnswerStore + ?Sized> AnswerStore for Arc<T> {
    fn get_state_answers(&self, key: &StateAnswersKey) -> Result<Option<StateAnswers>> {
        (**self).get_state_answers(key)
    }

    fn upsert_state_answers(
        &self,
        key: &StateAnswersKey,
        update: &mut StateAnswersUpdate<'_>,
    ) -> Result<StateAnswers> {
        (**self).upsert_state_answers(key, update)
    }

    fn get_answer_logs(&self, keys: &[AnswerLogKey]) -> Result<Vec<AnswerLog>> {
        (**self).get_answer_logs(keys)
    }

    fn update_answer_log(
        &self,
        key: &AnswerLogKey,
        update: &mut dyn FnMut(&mut AnswerLog),
    ) -> Result<AnswerLog> {
        (**self).update_answer_log(key, update)
    }
}

/// Test utilities for store implementations.
#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::core::{AnswerRecord, AnswerValue, SUBMIT_HANDLER_NAME};
    use crate::error::TallyError;

    pub fn sample_record(answer: &str) -> AnswerRecord {
        AnswerRecord {
            answer_value: AnswerValue::from(answer),
            time_spent_in_sec: 5.0,
            rule_str: "Default".to_string(),
            session_id: "session".to_string(),
            handler_name: SUBMIT_HANDLER_NAME.to_string(),
            interaction_id: None,
            params: BTreeMap::new(),
        }
    }

    /// Test helper to verify AnswerStore implementations.
    pub fn test_answer_store_contract<S: AnswerStore>(store: &S) {
        let key = StateAnswersKey::new("eid", 1, "State 1");

        // Initially absent
        assert!(store.get_state_answers(&key).unwrap().is_none());

        // First upsert creates
        store
            .upsert_state_answers(&key, &mut |existing| {
                assert!(existing.is_none());
                let mut answers = StateAnswers::new(key.clone(), Some("TextInput".to_string()));
                answers.append(sample_record("a1"));
                Ok(answers)
            })
            .unwrap();

        // Second upsert sees the first
        store
            .upsert_state_answers(&key, &mut |existing| {
                let mut answers = existing.expect("collection should exist");
                answers.append(sample_record("a2"));
                Ok(answers)
            })
            .unwrap();

        let stored = store.get_state_answers(&key).unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.interaction_id(), Some("TextInput"));

        // A failed update writes nothing
        let result = store.upsert_state_answers(&key, &mut |_| {
            Err(TallyError::validation("rejected"))
        });
        assert!(result.is_err());
        assert_eq!(store.get_state_answers(&key).unwrap().unwrap().len(), 2);

        // Other versions are separate collections
        let other = StateAnswersKey::new("eid", 2, "State 1");
        assert!(store.get_state_answers(&other).unwrap().is_none());

        // Answer logs
        let log_key = AnswerLogKey::new("eid", "State 1", "Default");
        let other_log_key = AnswerLogKey::new("eid", "State 2", "Default");
        assert!(store.get_answer_log(&log_key).unwrap().is_empty());

        store
            .update_answer_log(&log_key, &mut |log| {
                log.record("a1");
                log.record("a1");
            })
            .unwrap();
        let updated = store
            .update_answer_log(&log_key, &mut |log| log.record("a2"))
            .unwrap();
        assert_eq!(updated.total_answer_count(), 3);

        let logs = store
            .get_answer_logs(&[other_log_key.clone(), log_key.clone()])
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].is_empty());
        assert_eq!(logs[1].count("a1"), 2);

        store
            .update_answer_log(&log_key, &mut |log| {
                log.resolve("a1");
            })
            .unwrap();
        assert_eq!(store.get_answer_log(&log_key).unwrap().count("a1"), 0);
        assert_eq!(store.get_answer_log(&log_key).unwrap().count("a2"), 1);
    }
}
