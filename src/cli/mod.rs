//! CLI commands for Tally.
//!
//! - **Recording**: record, event
//! - **Curation**: resolve, answers
//! - **Reports**: improvements, stats
//!
//! Every command runs against a [`StatsService`] and returns an output
//! struct that renders as text or JSON.

use std::path::Path;

use crate::config::{data_dir, events_log_path, Config};
use crate::error::{Result, TallyError};
use crate::stats::{EventLog, StatsService};
use crate::storage::{FileAnswerStore, FileExplorationStore, FileStatisticsStore};

// Recording commands
pub mod event;
pub mod record;

// Curation commands
pub mod answers;
pub mod resolve;

// Report commands
pub mod improvements;
pub mod stats;

pub use answers::AnswersCommand;
pub use event::EventCommand;
pub use improvements::ImprovementsCommand;
pub use record::RecordCommand;
pub use resolve::ResolveCommand;
pub use stats::StatsCommand;

/// The service the binary runs against.
pub type FileStatsService = StatsService<FileExplorationStore, FileStatisticsStore, FileAnswerStore>;

/// Open file-backed stores in the data directory for `cwd`.
pub fn open_file_service(cwd: &Path, config: Config) -> Result<FileStatsService> {
    let data_dir = data_dir(cwd).ok_or_else(|| {
        TallyError::config("Could not determine data directory (no home directory)")
    })?;

    let service = StatsService::new(
        FileExplorationStore::with_dir(&data_dir),
        FileStatisticsStore::with_dir(&data_dir),
        FileAnswerStore::with_dir(&data_dir),
        config,
    );
    Ok(service.with_event_log(EventLog::new(events_log_path(&data_dir))))
}

/// Render an output as pretty JSON.
pub(crate) fn to_json<T: serde::Serialize>(output: &T) -> String {
    serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
}
