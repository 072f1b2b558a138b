//! Answer recording and exploration statistics.
//!
//! Answers are validated and appended by the recorder; the service ties the
//! recorder, the ranking and the report together. Learner events go to an
//! append-only JSONL log (`events.log`) that the batch aggregator reads.

pub mod events;
pub mod recorder;
pub mod service;
pub mod view;

pub use events::{EventLocation, EventLog, LearnerEvent, LearnerEventType, EVENT_SCHEMA_VERSION};
pub use recorder::{validate_submission, AnswerRecorder};
pub use service::{FetchMode, RuleStats, StatsService};
pub use view::{ExplorationStatsView, StateStatsEntry};
