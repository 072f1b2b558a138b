//! File-based stores for Tally.
//!
//! Every document is a JSON file under the data directory:
//!
//! ```text
//! <data>/explorations/<id>/<version>.json
//! <data>/statistics/<id>/<version>.json
//! <data>/answers/<id>/<version>/<state>.json
//! <data>/answer_logs/<id>/<state>/<rule>.json
//! ```
//!
//! Identifiers are escaped with [`encode_component`] so that state names and
//! rule strings can never leave their directory. Writes go through a temp
//! file and a rename.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::core::{
    AnswerLog, AnswerLogKey, Exploration, ExplorationStatistics, StateAnswers, StateAnswersKey,
};
use crate::error::{Result, TallyError};
use crate::storage::traits::StateAnswersUpdate;
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};
use crate::util::{
    encode_component, list_versions, read_json, read_json_unbounded, write_json_atomic,
};

fn version_file(version: u32) -> String {
    format!("{}.json", version)
}

/// Exploration definitions published into the data directory.
#[derive(Debug, Clone)]
pub struct FileExplorationStore {
    root: PathBuf,
}

impl FileExplorationStore {
    /// Open the store rooted at `data_dir`.
    pub fn with_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("explorations"),
        }
    }

    fn exploration_dir(&self, id: &str) -> PathBuf {
        self.root.join(encode_component(id))
    }

    /// Publish one exploration version.
    pub fn put(&self, exploration: &Exploration) -> Result<()> {
        let path = self
            .exploration_dir(&exploration.id)
            .join(version_file(exploration.version));
        write_json_atomic(&path, exploration)
    }
}

impl ExplorationStore for FileExplorationStore {
    fn get_exploration(&self, id: &str, version: Option<u32>) -> Result<Option<Exploration>> {
        let dir = self.exploration_dir(id);
        let version = match version {
            Some(v) => v,
            None => match list_versions(&dir)?.last() {
                Some(latest) => *latest,
                None => return Ok(None),
            },
        };
        read_json(&dir.join(version_file(version)))
    }
}

/// Statistics snapshots published into the data directory.
#[derive(Debug, Clone)]
pub struct FileStatisticsStore {
    root: PathBuf,
}

impl FileStatisticsStore {
    /// Open the store rooted at `data_dir`.
    pub fn with_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("statistics"),
        }
    }

    fn exploration_dir(&self, id: &str) -> PathBuf {
        self.root.join(encode_component(id))
    }

    /// Publish the snapshot for one exploration version.
    pub fn put(
        &self,
        exploration_id: &str,
        version: u32,
        statistics: &ExplorationStatistics,
    ) -> Result<()> {
        let path = self
            .exploration_dir(exploration_id)
            .join(version_file(version));
        write_json_atomic(&path, statistics)
    }
}

impl StatisticsStore for FileStatisticsStore {
    fn get_statistics(
        &self,
        exploration_id: &str,
        version: u32,
    ) -> Result<Option<ExplorationStatistics>> {
        read_json(
            &self
                .exploration_dir(exploration_id)
                .join(version_file(version)),
        )
    }

    fn list_versions(&self, exploration_id: &str) -> Result<Vec<u32>> {
        list_versions(&self.exploration_dir(exploration_id))
    }
}

/// Answer collections and answer logs kept in the data directory.
///
/// Read-modify-write cycles are serialized within the process. Separate
/// processes writing the same key are not coordinated.
#[derive(Debug)]
pub struct FileAnswerStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAnswerStore {
    /// Open the store rooted at `data_dir`.
    pub fn with_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn state_answers_path(&self, key: &StateAnswersKey) -> PathBuf {
        self.data_dir
            .join("answers")
            .join(encode_component(&key.exploration_id))
            .join(key.exploration_version.to_string())
            .join(format!("{}.json", encode_component(&key.state_name)))
    }

    fn answer_log_path(&self, key: &AnswerLogKey) -> PathBuf {
        self.data_dir
            .join("answer_logs")
            .join(encode_component(&key.exploration_id))
            .join(encode_component(&key.state_name))
            .join(format!("{}.json", encode_component(&key.rule_str)))
    }
}

impl AnswerStore for FileAnswerStore {
    fn get_state_answers(&self, key: &StateAnswersKey) -> Result<Option<StateAnswers>> {
        read_json_unbounded(&self.state_answers_path(key))
    }

    fn upsert_state_answers(
        &self,
        key: &StateAnswersKey,
        update: &mut StateAnswersUpdate<'_>,
    ) -> Result<StateAnswers> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| TallyError::upstream("answer store lock poisoned"))?;

        let path = self.state_answers_path(key);
        let updated = update(read_json_unbounded(&path)?)?;
        write_json_atomic(&path, &updated)?;
        debug!(path = %path.display(), records = updated.len(), "wrote state answers");
        Ok(updated)
    }

    fn get_answer_logs(&self, keys: &[AnswerLogKey]) -> Result<Vec<AnswerLog>> {
        keys.iter()
            .map(|key| Ok(read_json(&self.answer_log_path(key))?.unwrap_or_default()))
            .collect()
    }

    fn update_answer_log(
        &self,
        key: &AnswerLogKey,
        update: &mut dyn FnMut(&mut AnswerLog),
    ) -> Result<AnswerLog> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| TallyError::upstream("answer store lock poisoned"))?;

        let path = self.answer_log_path(key);
        let mut log: AnswerLog = read_json(&path)?.unwrap_or_default();
        update(&mut log);
        write_json_atomic(&path, &log)?;
        debug!(
            path = %path.display(),
            total = log.total_answer_count(),
            "wrote answer log"
        );
        Ok(log)
    }
}
