//! The statistics facade.
//!
//! [`StatsService`] wires the three stores, the recorder, the ranking and
//! the report together and is what the CLI (or any other front end) calls.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::core::{
    rank_states, AnswerLog, AnswerLogKey, AnswerRecord, AnswerSubmission, Exploration,
    ExplorationStatistics, ImprovementFlag, StateAnswers, StateAnswersKey, DEFAULT_RULESPEC_STR,
    SUBMIT_HANDLER_NAME,
};
use crate::error::{FailOpen, Result};
use crate::stats::events::{EventLocation, EventLog, LearnerEventType};
use crate::stats::recorder::AnswerRecorder;
use crate::stats::view::ExplorationStatsView;
use crate::storage::{AnswerStore, ExplorationStore, StatisticsStore};

/// How to treat a failed statistics fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Log the failure and continue with zero counts.
    #[default]
    BestEffort,
    /// Propagate the failure.
    Strict,
}

/// Answer statistics for one rule of a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    /// `submit.<rule_str>`
    pub key: String,
    pub rule_str: String,
    /// Most frequent unresolved answers, highest count first.
    pub answers: Vec<(String, u64)>,
    /// Total unresolved answers for the rule.
    pub rule_hits: u64,
}

/// Entry point for recording answers and reading statistics.
pub struct StatsService<E, S, A> {
    explorations: E,
    statistics: S,
    answers: A,
    events: Option<EventLog>,
    config: Config,
}

impl<E, S, A> StatsService<E, S, A>
where
    E: ExplorationStore,
    S: StatisticsStore,
    A: AnswerStore,
{
    /// Create a service without an event log.
    pub fn new(explorations: E, statistics: S, answers: A, config: Config) -> Self {
        Self {
            explorations,
            statistics,
            answers,
            events: None,
            config,
        }
    }

    /// Append learner events to `events`.
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn event_log(&self) -> Option<&EventLog> {
        self.events.as_ref()
    }

    fn active_event_log(&self) -> Option<&EventLog> {
        self.events.as_ref().filter(|_| self.config.events.enabled)
    }

    /// Best-effort append used after a successful write.
    fn append_event_fail_open(&self, data: LearnerEventType) {
        if let Some(log) = self.active_event_log() {
            log.append_event(data)
                .fail_open_default("failed to append learner event");
        }
    }

    /// Append a learner event.
    ///
    /// Returns `false` when event logging is off.
    pub fn record_event(&self, data: LearnerEventType) -> Result<bool> {
        match self.active_event_log() {
            Some(log) => {
                log.append_event(data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -- Recording --

    /// Record a submitted answer end to end.
    ///
    /// Stores the record in the state's answer collection, counts its
    /// normalized value in the rule's answer log and appends an
    /// `answer_submitted` event. Validation failures write nothing.
    ///
    /// Once the record is stored the call succeeds: a failed count or
    /// event append is logged and skipped, so a retry never stores the
    /// record twice.
    pub fn submit_answer(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        state_name: &str,
        submission: &AnswerSubmission,
    ) -> Result<AnswerRecord> {
        let record =
            self.record_answer(exploration_id, exploration_version, state_name, submission)?;

        let answer = record.answer_value.log_key();
        self.record_rule_answer(exploration_id, state_name, &record.rule_str, &answer)
            .map(|_| ())
            .fail_open_default("failed to count submitted answer");

        self.append_event_fail_open(LearnerEventType::answer_submitted(
            EventLocation::new(exploration_id, exploration_version, state_name),
            record.session_id.clone(),
            record.rule_str.clone(),
            answer,
        ));

        Ok(record)
    }

    /// Validate and append a record to the state's answer collection only.
    pub fn record_answer(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        state_name: &str,
        submission: &AnswerSubmission,
    ) -> Result<AnswerRecord> {
        AnswerRecorder::new(&self.explorations, &self.answers, &self.config.answers)
            .record_answer(exploration_id, exploration_version, state_name, submission)
    }

    /// Count one occurrence of `answer` in a rule's answer log.
    pub fn record_rule_answer(
        &self,
        exploration_id: &str,
        state_name: &str,
        rule_str: &str,
        answer: &str,
    ) -> Result<AnswerLog> {
        let key = AnswerLogKey::new(exploration_id, state_name, rule_str);
        let log = self
            .answers
            .update_answer_log(&key, &mut |log| log.record(answer))?;
        tracing::debug!(
            exploration_id,
            state_name,
            rule_str,
            total = log.total_answer_count(),
            "counted answer"
        );
        Ok(log)
    }

    // -- Resolution --

    /// Remove answers from a rule's log.
    ///
    /// Returns how many of them were present.
    pub fn resolve_answers<T: AsRef<str>>(
        &self,
        exploration_id: &str,
        state_name: &str,
        rule_str: &str,
        answers: &[T],
    ) -> Result<usize> {
        let key = AnswerLogKey::new(exploration_id, state_name, rule_str);
        let mut resolved = 0;
        self.answers.update_answer_log(&key, &mut |log| {
            resolved = log.resolve_all(answers);
        })?;

        tracing::debug!(exploration_id, state_name, rule_str, resolved, "resolved answers");
        self.append_event_fail_open(LearnerEventType::answers_resolved(
            exploration_id,
            state_name,
            rule_str,
            resolved,
        ));
        Ok(resolved)
    }

    /// Remove answers from the default rule's log.
    pub fn resolve_default_rule_answers<T: AsRef<str>>(
        &self,
        exploration_id: &str,
        state_name: &str,
        answers: &[T],
    ) -> Result<usize> {
        self.resolve_answers(exploration_id, state_name, DEFAULT_RULESPEC_STR, answers)
    }

    // -- Reads --

    /// The answer log of one rule.
    pub fn answer_log(
        &self,
        exploration_id: &str,
        state_name: &str,
        rule_str: &str,
    ) -> Result<AnswerLog> {
        self.answers
            .get_answer_log(&AnswerLogKey::new(exploration_id, state_name, rule_str))
    }

    /// The most frequent answers that matched no answer group.
    pub fn top_unresolved_answers_for_default_rule(
        &self,
        exploration_id: &str,
        state_name: &str,
    ) -> Result<Vec<(String, u64)>> {
        let key = AnswerLogKey::new(exploration_id, state_name, DEFAULT_RULESPEC_STR);
        Ok(self
            .answers
            .get_answer_log(&key)?
            .get_top_answers(self.config.answers.top_unresolved_limit))
    }

    /// Per-rule answer statistics for a state of the latest exploration.
    ///
    /// One entry per rule of each answer group in declared order, then the
    /// default rule if the state has a default outcome. An unknown
    /// exploration or state yields no entries.
    pub fn state_rules_stats(
        &self,
        exploration_id: &str,
        state_name: &str,
    ) -> Result<Vec<RuleStats>> {
        let Some(exploration) = self.explorations.get_exploration(exploration_id, None)? else {
            return Ok(Vec::new());
        };
        let Some(state) = exploration.state(state_name) else {
            return Ok(Vec::new());
        };

        let mut rule_strs: Vec<String> = state
            .interaction
            .answer_groups
            .iter()
            .flat_map(|group| group.rule_specs.iter().map(|rule| rule.stringify()))
            .collect();
        if state.interaction.default_outcome.is_some() {
            rule_strs.push(DEFAULT_RULESPEC_STR.to_string());
        }

        let keys: Vec<AnswerLogKey> = rule_strs
            .iter()
            .map(|rule_str| AnswerLogKey::new(exploration_id, state_name, rule_str.as_str()))
            .collect();
        let logs = self.answers.get_answer_logs(&keys)?;

        let limit = self.config.answers.rule_stats_limit;
        Ok(rule_strs
            .into_iter()
            .zip(logs)
            .map(|(rule_str, log)| RuleStats {
                key: format!("{}.{}", SUBMIT_HANDLER_NAME, rule_str),
                answers: log.get_top_answers(limit),
                rule_hits: log.total_answer_count(),
                rule_str,
            })
            .collect())
    }

    /// The stored answer collection of one state, if any.
    pub fn state_answers(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        state_name: &str,
    ) -> Result<Option<StateAnswers>> {
        let key = StateAnswersKey::new(exploration_id, exploration_version, state_name);
        self.answers.get_state_answers(&key)
    }

    /// Versions that have batch statistics.
    pub fn versions_for_exploration_stats(&self, exploration_id: &str) -> Result<Vec<u32>> {
        self.statistics.list_versions(exploration_id)
    }

    /// States that need improvement, highest rank first.
    pub fn state_improvements(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        mode: FetchMode,
    ) -> Result<Vec<ImprovementFlag>> {
        let Some(exploration) = self.load_exploration(exploration_id, exploration_version)? else {
            return Ok(Vec::new());
        };
        let statistics = self.load_statistics(exploration_id, exploration_version, mode)?;
        self.rank(&exploration, statistics.as_ref())
    }

    /// The full statistics report for one exploration version.
    ///
    /// An unknown exploration produces a report with no states.
    pub fn exploration_stats(
        &self,
        exploration_id: &str,
        exploration_version: u32,
        mode: FetchMode,
    ) -> Result<ExplorationStatsView> {
        let exploration = self
            .load_exploration(exploration_id, exploration_version)?
            .unwrap_or_else(|| Exploration::new(exploration_id, exploration_version));
        let statistics = self.load_statistics(exploration_id, exploration_version, mode)?;
        let improvements = self.rank(&exploration, statistics.as_ref())?;

        let versions = match mode {
            FetchMode::Strict => self.versions_for_exploration_stats(exploration_id)?,
            FetchMode::BestEffort => self
                .versions_for_exploration_stats(exploration_id)
                .fail_open_default("failed to list statistics versions"),
        };

        Ok(ExplorationStatsView::build(
            &exploration,
            &statistics.unwrap_or_default(),
            improvements,
            versions,
        ))
    }

    // -- Helpers --

    /// The requested exploration version, or the latest one if that version
    /// is unknown.
    fn load_exploration(&self, exploration_id: &str, version: u32) -> Result<Option<Exploration>> {
        match self.explorations.get_exploration(exploration_id, Some(version))? {
            Some(exploration) => Ok(Some(exploration)),
            None => self.explorations.get_exploration(exploration_id, None),
        }
    }

    fn load_statistics(
        &self,
        exploration_id: &str,
        version: u32,
        mode: FetchMode,
    ) -> Result<Option<ExplorationStatistics>> {
        let fetched = self.statistics.get_statistics(exploration_id, version);
        match mode {
            FetchMode::Strict => fetched,
            FetchMode::BestEffort => {
                Ok(fetched.fail_open_default("failed to fetch exploration statistics"))
            }
        }
    }

    fn rank(
        &self,
        exploration: &Exploration,
        statistics: Option<&ExplorationStatistics>,
    ) -> Result<Vec<ImprovementFlag>> {
        let keys: Vec<AnswerLogKey> = exploration
            .state_names()
            .map(|name| AnswerLogKey::new(exploration.id.as_str(), name, DEFAULT_RULESPEC_STR))
            .collect();
        let logs = self.answers.get_answer_logs(&keys)?;

        let default_rule_logs: Vec<(String, AnswerLog)> = keys
            .into_iter()
            .map(|key| key.state_name)
            .zip(logs)
            .collect();

        Ok(rank_states(
            exploration,
            statistics,
            &default_rule_logs,
            &self.config.improvements.policy(),
        ))
    }
}
