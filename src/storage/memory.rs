//! In-memory stores for tests and embedding.
//!
//! Thread-safe implementations using `RwLock<HashMap>`. Everything is lost
//! when the store is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::core::{
    AnswerLog, AnswerLogKey, Exploration, ExplorationStatistics, StateAnswers, StateAnswersKey,
};
use crate::error::{Result, TallyError};
use crate::storage::traits::StateAnswersUpdate;
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

fn poisoned<T>(_: PoisonError<T>) -> TallyError {
    TallyError::upstream("in-memory store lock poisoned")
}

/// In-memory exploration definitions, keyed by id then version.
#[derive(Debug, Default)]
pub struct MemoryExplorationStore {
    explorations: RwLock<HashMap<String, BTreeMap<u32, Exploration>>>,
}

impl MemoryExplorationStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one exploration version.
    pub fn insert(&self, exploration: Exploration) -> Result<()> {
        let mut explorations = self.explorations.write().map_err(poisoned)?;
        explorations
            .entry(exploration.id.clone())
            .or_default()
            .insert(exploration.version, exploration);
        Ok(())
    }
}

impl ExplorationStore for MemoryExplorationStore {
    fn get_exploration(&self, id: &str, version: Option<u32>) -> Result<Option<Exploration>> {
        let explorations = self.explorations.read().map_err(poisoned)?;
        let Some(versions) = explorations.get(id) else {
            return Ok(None);
        };
        let found = match version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        };
        Ok(found.cloned())
    }
}

/// In-memory statistics snapshots, keyed by exploration id then version.
#[derive(Debug, Default)]
pub struct MemoryStatisticsStore {
    snapshots: RwLock<HashMap<String, BTreeMap<u32, ExplorationStatistics>>>,
}

impl MemoryStatisticsStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a snapshot for one exploration version.
    pub fn insert(
        &self,
        exploration_id: impl Into<String>,
        version: u32,
        statistics: ExplorationStatistics,
    ) -> Result<()> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        snapshots
            .entry(exploration_id.into())
            .or_default()
            .insert(version, statistics);
        Ok(())
    }
}

impl StatisticsStore for MemoryStatisticsStore {
    fn get_statistics(
        &self,
        exploration_id: &str,
        version: u32,
    ) -> Result<Option<ExplorationStatistics>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots
            .get(exploration_id)
            .and_then(|versions| versions.get(&version))
            .cloned())
    }

    fn list_versions(&self, exploration_id: &str) -> Result<Vec<u32>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots
            .get(exploration_id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }
}

/// In-memory answer collections and answer logs.
#[derive(Debug, Default)]
pub struct MemoryAnswerStore {
    state_answers: RwLock<HashMap<StateAnswersKey, StateAnswers>>,
    answer_logs: RwLock<HashMap<AnswerLogKey, AnswerLog>>,
}

impl MemoryAnswerStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of answer collections in the store.
    pub fn state_answers_len(&self) -> usize {
        self.state_answers.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Number of answer logs in the store.
    pub fn answer_logs_len(&self) -> usize {
        self.answer_logs.read().map(|m| m.len()).unwrap_or(0)
    }
}

impl AnswerStore for MemoryAnswerStore {
    fn get_state_answers(&self, key: &StateAnswersKey) -> Result<Option<StateAnswers>> {
        let state_answers = self.state_answers.read().map_err(poisoned)?;
        Ok(state_answers.get(key).cloned())
    }

    fn upsert_state_answers(
        &self,
        key: &StateAnswersKey,
        update: &mut StateAnswersUpdate<'_>,
    ) -> Result<StateAnswers> {
        let mut state_answers = self.state_answers.write().map_err(poisoned)?;
        let updated = update(state_answers.get(key).cloned())?;
        state_answers.insert(key.clone(), updated.clone());
        Ok(updated)
    }

    fn get_answer_logs(&self, keys: &[AnswerLogKey]) -> Result<Vec<AnswerLog>> {
        let answer_logs = self.answer_logs.read().map_err(poisoned)?;
        Ok(keys
            .iter()
            .map(|key| answer_logs.get(key).cloned().unwrap_or_default())
            .collect())
    }

    fn update_answer_log(
        &self,
        key: &AnswerLogKey,
        update: &mut dyn FnMut(&mut AnswerLog),
    ) -> Result<AnswerLog> {
        let mut answer_logs = self.answer_logs.write().map_err(poisoned)?;
        let log = answer_logs.entry(key.clone()).or_default();
        update(log);
        Ok(log.clone())
    }
}
