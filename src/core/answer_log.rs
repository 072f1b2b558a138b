//! Per-rule answer frequency logs.
//!
//! An [`AnswerLog`] counts how often each normalized answer was classified
//! under one rule of one state. Resolving an answer removes every recorded
//! occurrence of it; the log never holds a zero count.

use serde::{Deserialize, Serialize};

/// Identifies the answer log of one rule within one exploration state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnswerLogKey {
    /// The exploration the state belongs to.
    pub exploration_id: String,
    /// The state whose rule matched.
    pub state_name: String,
    /// Stringified rule (see [`crate::core::RuleSpec::stringify`]).
    pub rule_str: String,
}

impl AnswerLogKey {
    /// Create a new key.
    pub fn new(
        exploration_id: impl Into<String>,
        state_name: impl Into<String>,
        rule_str: impl Into<String>,
    ) -> Self {
        Self {
            exploration_id: exploration_id.into(),
            state_name: state_name.into(),
            rule_str: rule_str.into(),
        }
    }
}

/// One distinct answer and how many times it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCount {
    pub answer: String,
    pub count: u64,
}

/// Frequency table of unresolved answers for one rule.
///
/// Entries are kept in first-seen order, which is also the tie-break used
/// by [`AnswerLog::get_top_answers`]. A resolved answer that is submitted
/// again counts as first seen at that point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerLog {
    entries: Vec<AnswerCount>,
}

impl AnswerLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `answer`.
    pub fn record(&mut self, answer: &str) {
        match self.entries.iter_mut().find(|e| e.answer == answer) {
            Some(entry) => entry.count += 1,
            None => self.entries.push(AnswerCount {
                answer: answer.to_string(),
                count: 1,
            }),
        }
    }

    /// Remove every recorded occurrence of `answer`.
    ///
    /// Returns whether anything was removed. Resolving an absent answer is a
    /// no-op.
    pub fn resolve(&mut self, answer: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.answer != answer);
        self.entries.len() != before
    }

    /// Resolve several answers, returning how many were present.
    pub fn resolve_all<I, S>(&mut self, answers: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        answers
            .into_iter()
            .filter(|a| self.resolve(a.as_ref()))
            .count()
    }

    /// The count recorded for `answer`, zero when absent.
    pub fn count(&self, answer: &str) -> u64 {
        self.entries
            .iter()
            .find(|e| e.answer == answer)
            .map(|e| e.count)
            .unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total_answer_count(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }

    /// Up to `n` answers, most frequent first; ties keep first-seen order.
    pub fn get_top_answers(&self, n: usize) -> Vec<(String, u64)> {
        let mut sorted: Vec<&AnswerCount> = self.entries.iter().collect();
        // sort_by is stable, so equal counts stay in first-seen order
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted
            .into_iter()
            .take(n)
            .map(|e| (e.answer.clone(), e.count))
            .collect()
    }

    /// All entries in first-seen order.
    pub fn answers(&self) -> &[AnswerCount] {
        &self.entries
    }

    /// Number of distinct unresolved answers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
