//! Read-only view of an exploration definition.
//!
//! Explorations are authored and versioned elsewhere; Tally only needs the
//! state graph: each state's interaction, its answer groups and rules, and
//! where the default outcome leads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rule string under which answers that matched no answer group are logged.
pub const DEFAULT_RULESPEC_STR: &str = "Default";

/// A versioned exploration. States are kept in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exploration {
    pub id: String,
    pub version: u32,
    #[serde(default)]
    pub init_state_name: String,
    #[serde(default)]
    pub states: Vec<State>,
}

impl Exploration {
    /// Create an exploration with no states.
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
            init_state_name: String::new(),
            states: Vec::new(),
        }
    }

    /// Append a state. The first state added becomes the initial state.
    pub fn with_state(mut self, state: State) -> Self {
        if self.states.is_empty() && self.init_state_name.is_empty() {
            self.init_state_name = state.name.clone();
        }
        self.states.push(state);
        self
    }

    /// Look up a state by name.
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// State names in declared order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }
}

/// One screen of an exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    #[serde(default)]
    pub interaction: Interaction,
}

impl State {
    /// A state with an interaction whose default outcome loops back to it.
    pub fn self_looping(name: impl Into<String>, interaction_id: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            interaction: Interaction {
                id: Some(interaction_id.into()),
                answer_groups: Vec::new(),
                default_outcome: Some(Outcome::new(name.clone())),
            },
            name,
        }
    }

    /// Whether the default outcome sends the learner back to this state.
    pub fn default_outcome_is_self_loop(&self) -> bool {
        self.interaction
            .default_outcome
            .as_ref()
            .is_some_and(|o| o.dest == self.name)
    }
}

/// The question type of a state and how answers are classified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Interaction type (e.g. `TextInput`); `None` for terminal states.
    pub id: Option<String>,
    #[serde(default)]
    pub answer_groups: Vec<AnswerGroup>,
    /// Where learners go when no answer group matches.
    pub default_outcome: Option<Outcome>,
}

/// Rules sharing one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerGroup {
    pub outcome: Outcome,
    #[serde(default)]
    pub rule_specs: Vec<RuleSpec>,
}

/// A transition target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub dest: String,
}

impl Outcome {
    pub fn new(dest: impl Into<String>) -> Self {
        Self { dest: dest.into() }
    }
}

/// A classifier over learner answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub rule_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

impl RuleSpec {
    pub fn new(rule_type: impl Into<String>) -> Self {
        Self {
            rule_type: rule_type.into(),
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// The string answer logs are keyed by, e.g. `Equals(Text)`.
    ///
    /// Inputs are rendered in input-name order; string inputs are rendered
    /// without quotes.
    pub fn stringify(&self) -> String {
        let inputs: Vec<String> = self
            .inputs
            .values()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        format!("{}({})", self.rule_type, inputs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_state_is_initial() {
        let exp = Exploration::new("eid", 1)
            .with_state(State::self_looping("Intro", "TextInput"))
            .with_state(State::self_looping("End", "EndExploration"));

        assert_eq!(exp.init_state_name, "Intro");
        assert_eq!(exp.state_names().collect::<Vec<_>>(), vec!["Intro", "End"]);
        assert!(exp.state("End").is_some());
        assert!(exp.state("Missing").is_none());
    }

    #[test]
    fn test_self_loop_detection() {
        let looping = State::self_looping("Q1", "TextInput");
        assert!(looping.default_outcome_is_self_loop());

        let mut forward = State::self_looping("Q1", "TextInput");
        forward.interaction.default_outcome = Some(Outcome::new("Q2"));
        assert!(!forward.default_outcome_is_self_loop());

        let mut terminal = State::self_looping("End", "EndExploration");
        terminal.interaction.default_outcome = None;
        assert!(!terminal.default_outcome_is_self_loop());
    }

    #[test]
    fn test_rule_stringify() {
        let rule = RuleSpec::new("Equals").with_input("x", "Text");
        assert_eq!(rule.stringify(), "Equals(Text)");

        let rule = RuleSpec::new("IsInclusivelyBetween")
            .with_input("a", 1)
            .with_input("b", 10);
        assert_eq!(rule.stringify(), "IsInclusivelyBetween(1,10)");

        assert_eq!(RuleSpec::new("IsTrue").stringify(), "IsTrue()");
    }

    #[test]
    fn test_deserialize_minimal_exploration() {
        let json = r#"{
            "id": "eid",
            "version": 2,
            "states": [
                {"name": "A", "interaction": {"id": "TextInput", "default_outcome": {"dest": "A"}}},
                {"name": "END"}
            ]
        }"#;

        let exp: Exploration = serde_json::from_str(json).unwrap();
        assert_eq!(exp.version, 2);
        assert!(exp.states[0].default_outcome_is_self_loop());
        assert_eq!(exp.states[1].interaction.id, None);
        assert!(exp.states[1].interaction.answer_groups.is_empty());
    }
}
