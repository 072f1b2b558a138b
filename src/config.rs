//! Configuration loading for Tally.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.tally/config.toml`)
//! 3. User config (`~/.tally/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The defaults reproduce the platform's
//! reference behavior (500-byte answers, 20% threshold).

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::improvements::defaults::THRESHOLD_RATIO;
use crate::core::{RankingPolicy, TieBreak};
use crate::error::{Result, TallyError};

/// Main configuration struct for Tally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Answer recording configuration.
    pub answers: AnswersConfig,
    /// Improvement ranking configuration.
    pub improvements: ImprovementsConfig,
    /// Learner event log configuration.
    pub events: EventsConfig,
}

/// Answer recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnswersConfig {
    /// Largest answer value stored as-is.
    pub max_bytes_per_answer_value: usize,
    /// Prefix marking a text answer that was cut to fit.
    pub cropped_prefix: String,
    /// Stored in place of a non-text answer that is too large.
    pub too_large_placeholder: String,
    /// How many unresolved default-rule answers to surface.
    pub top_unresolved_limit: usize,
    /// How many answers to report per rule.
    pub rule_stats_limit: usize,
}

impl Default for AnswersConfig {
    fn default() -> Self {
        Self {
            max_bytes_per_answer_value: 500,
            cropped_prefix: "CROPPED: ".to_string(),
            too_large_placeholder: "TOO LARGE NONSTRING".to_string(),
            top_unresolved_limit: 3,
            rule_stats_limit: 5,
        }
    }
}

/// Valid values for the tie-break field.
pub const VALID_TIE_BREAKS: &[&str] = &["default", "incomplete"];

/// Improvement ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImprovementsConfig {
    /// Fraction of state entries a signal must exceed.
    pub threshold_ratio: f64,
    /// Flag kept when both candidates of a state rank equally.
    pub tie_break: String,
}

impl ImprovementsConfig {
    /// Check if a threshold ratio is valid (finite, in (0.0, 1.0]).
    pub fn is_valid_threshold_ratio(value: f64) -> bool {
        value.is_finite() && value > 0.0 && value <= 1.0
    }

    /// Check if a tie-break value is valid.
    pub fn is_valid_tie_break(value: &str) -> bool {
        VALID_TIE_BREAKS.contains(&value)
    }

    /// The ranking policy these settings describe.
    ///
    /// Invalid file values fall back to the defaults.
    pub fn policy(&self) -> RankingPolicy {
        let threshold_ratio = if Self::is_valid_threshold_ratio(self.threshold_ratio) {
            self.threshold_ratio
        } else {
            tracing::warn!(
                value = self.threshold_ratio,
                "invalid improvements.threshold_ratio, using default"
            );
            THRESHOLD_RATIO
        };
        let tie_break = TieBreak::parse(&self.tie_break).unwrap_or_else(|| {
            tracing::warn!(
                value = %self.tie_break,
                "invalid improvements.tie_break, using default"
            );
            TieBreak::default()
        });

        RankingPolicy {
            threshold_ratio,
            tie_break,
        }
    }
}

impl Default for ImprovementsConfig {
    fn default() -> Self {
        Self {
            threshold_ratio: THRESHOLD_RATIO,
            tie_break: "default".to_string(),
        }
    }
}

/// Learner event log configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Whether learner events are appended to the event log.
    pub enabled: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.tally/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = tally_home()?;
        Self::load_optional(&home.join("config.toml"))
    }

    /// Load project config from the nearest `.tally/config.toml`.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        let config_path = find_project_root(cwd).join(".tally").join("config.toml");
        Self::load_optional(&config_path)
    }

    /// Load a config file that may be absent. An unreadable or malformed
    /// file is skipped with a warning.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(
                    "Ignoring config file {}: {}. Using remaining settings.",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| TallyError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| TallyError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // TALLY_MAX_ANSWER_BYTES
        if let Ok(val) = env::var("TALLY_MAX_ANSWER_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.answers.max_bytes_per_answer_value = n,
                _ => tracing::warn!(
                    "Invalid TALLY_MAX_ANSWER_BYTES value '{}'. \
                    Expected a positive integer. Using '{}'.",
                    val,
                    self.answers.max_bytes_per_answer_value
                ),
            }
        }

        // TALLY_THRESHOLD_RATIO
        if let Ok(val) = env::var("TALLY_THRESHOLD_RATIO") {
            match val.parse::<f64>() {
                Ok(n) if ImprovementsConfig::is_valid_threshold_ratio(n) => {
                    self.improvements.threshold_ratio = n;
                }
                _ => tracing::warn!(
                    "Invalid TALLY_THRESHOLD_RATIO value '{}'. \
                    Must be in range (0.0, 1.0]. Using '{}'.",
                    val,
                    self.improvements.threshold_ratio
                ),
            }
        }

        // TALLY_TIE_BREAK
        if let Ok(val) = env::var("TALLY_TIE_BREAK") {
            if ImprovementsConfig::is_valid_tie_break(&val) {
                self.improvements.tie_break = val;
            } else {
                tracing::warn!(
                    "Invalid TALLY_TIE_BREAK value '{}'. Valid values: {:?}. Using '{}'.",
                    val,
                    VALID_TIE_BREAKS,
                    self.improvements.tie_break
                );
            }
        }

        // TALLY_EVENTS_ENABLED
        if let Ok(val) = env::var("TALLY_EVENTS_ENABLED") {
            self.events.enabled = val == "true" || val == "1";
        }
    }

    /// Merge another config into this one, field by field.
    ///
    /// Non-default fields of `other` win. A layer cannot set a value back to
    /// its default once a lower layer changed it.
    fn merge(mut self, other: Config) -> Self {
        let default_answers = AnswersConfig::default();
        if other.answers.max_bytes_per_answer_value != default_answers.max_bytes_per_answer_value {
            self.answers.max_bytes_per_answer_value = other.answers.max_bytes_per_answer_value;
        }
        if other.answers.cropped_prefix != default_answers.cropped_prefix {
            self.answers.cropped_prefix = other.answers.cropped_prefix;
        }
        if other.answers.too_large_placeholder != default_answers.too_large_placeholder {
            self.answers.too_large_placeholder = other.answers.too_large_placeholder;
        }
        if other.answers.top_unresolved_limit != default_answers.top_unresolved_limit {
            self.answers.top_unresolved_limit = other.answers.top_unresolved_limit;
        }
        if other.answers.rule_stats_limit != default_answers.rule_stats_limit {
            self.answers.rule_stats_limit = other.answers.rule_stats_limit;
        }

        let default_improvements = ImprovementsConfig::default();
        if other.improvements.threshold_ratio != default_improvements.threshold_ratio {
            self.improvements.threshold_ratio = other.improvements.threshold_ratio;
        }
        if other.improvements.tie_break != default_improvements.tie_break {
            self.improvements.tie_break = other.improvements.tie_break;
        }

        if other.events.enabled != EventsConfig::default().enabled {
            self.events.enabled = other.events.enabled;
        }

        self
    }
}

/// Get the Tally home directory.
///
/// `TALLY_HOME` if set and non-empty, otherwise `~/.tally`.
pub fn tally_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("TALLY_HOME") {
        if home.is_empty() {
            tracing::warn!("TALLY_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("TALLY_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".tally"));
    }

    let fallback_path = fallback_tally_home();
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

#[cfg(unix)]
fn fallback_tally_home() -> PathBuf {
    use std::os::unix::fs::MetadataExt;
    let uid = std::fs::metadata("/").map(|m| m.uid()).unwrap_or(0);
    PathBuf::from(format!("/tmp/tally-{}", uid))
}

#[cfg(not(unix))]
fn fallback_tally_home() -> PathBuf {
    std::env::temp_dir().join("tally")
}

/// Find the project root for a given working directory.
///
/// The nearest ancestor holding a `.tally/` directory, else `cwd` itself.
pub fn find_project_root(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|ancestor| ancestor.join(".tally").is_dir())
        .unwrap_or(cwd)
        .to_path_buf()
}

/// Get the data directory the file-backed stores live in.
///
/// The project's `.tally/` when one exists, else `<tally_home>/data`.
pub fn data_dir(cwd: &Path) -> Option<PathBuf> {
    let project = find_project_root(cwd).join(".tally");
    if project.is_dir() {
        return Some(project);
    }
    tally_home().map(|h| h.join("data"))
}

/// Get the learner event log path inside a data directory.
pub fn events_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("events.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for var in [
            "TALLY_MAX_ANSWER_BYTES",
            "TALLY_THRESHOLD_RATIO",
            "TALLY_TIE_BREAK",
            "TALLY_EVENTS_ENABLED",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.answers.max_bytes_per_answer_value, 500);
        assert_eq!(config.answers.cropped_prefix, "CROPPED: ");
        assert_eq!(config.answers.too_large_placeholder, "TOO LARGE NONSTRING");
        assert_eq!(config.answers.top_unresolved_limit, 3);
        assert_eq!(config.answers.rule_stats_limit, 5);
        assert!((config.improvements.threshold_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.improvements.tie_break, "default");
        assert!(config.events.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[answers]
max_bytes_per_answer_value = 200

[improvements]
tie_break = "incomplete"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.answers.max_bytes_per_answer_value, 200);
        assert_eq!(config.answers.rule_stats_limit, 5);
        assert_eq!(config.improvements.tie_break, "incomplete");
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = Config::load_from_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(TallyError::Storage { .. })));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not [valid toml").unwrap();

        let result = Config::load_from_file(&path);
        assert!(matches!(result, Err(TallyError::Config { .. })));
    }

    #[test]
    fn test_load_optional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(Config::load_optional(&path).is_none());

        fs::write(&path, "not [valid toml").unwrap();
        assert!(Config::load_optional(&path).is_none());

        fs::write(&path, "[events]\nenabled = false\n").unwrap();
        assert!(!Config::load_optional(&path).unwrap().events.enabled);
    }

    #[test]
    #[serial]
    fn test_malformed_project_config_keeps_user_config() {
        clear_env();
        let home = TempDir::new().unwrap();
        env::set_var("TALLY_HOME", home.path());
        fs::write(
            home.path().join("config.toml"),
            "[answers]\nrule_stats_limit = 8\n",
        )
        .unwrap();

        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join(".tally")).unwrap();
        fs::write(
            project.path().join(".tally").join("config.toml"),
            "[answers\nrule_stats_limit = 10\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(project.path());
        assert_eq!(config.answers.rule_stats_limit, 8);

        env::remove_var("TALLY_HOME");
    }

    #[test]
    #[serial]
    fn test_project_config_precedence() {
        clear_env();
        let home = TempDir::new().unwrap();
        env::set_var("TALLY_HOME", home.path());
        fs::write(
            home.path().join("config.toml"),
            "[answers]\nrule_stats_limit = 8\ntop_unresolved_limit = 4\n",
        )
        .unwrap();

        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join(".tally")).unwrap();
        fs::write(
            project.path().join(".tally").join("config.toml"),
            "[answers]\nrule_stats_limit = 10\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(project.path());
        assert_eq!(config.answers.rule_stats_limit, 10);
        assert_eq!(config.answers.top_unresolved_limit, 4);

        env::remove_var("TALLY_HOME");
    }

    #[test]
    #[serial]
    fn test_env_var_precedence() {
        clear_env();
        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join(".tally")).unwrap();
        fs::write(
            project.path().join(".tally").join("config.toml"),
            "[improvements]\nthreshold_ratio = 0.5\n",
        )
        .unwrap();

        env::set_var("TALLY_THRESHOLD_RATIO", "0.3");
        let config = Config::load_from_cwd(project.path());
        assert!((config.improvements.threshold_ratio - 0.3).abs() < f64::EPSILON);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_var_invalid_values_ignored() {
        clear_env();
        env::set_var("TALLY_THRESHOLD_RATIO", "1.5");
        env::set_var("TALLY_TIE_BREAK", "coin-flip");
        env::set_var("TALLY_MAX_ANSWER_BYTES", "-4");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_var_valid_values_applied() {
        clear_env();
        env::set_var("TALLY_TIE_BREAK", "incomplete");
        env::set_var("TALLY_MAX_ANSWER_BYTES", "64");
        env::set_var("TALLY_EVENTS_ENABLED", "0");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.improvements.tie_break, "incomplete");
        assert_eq!(config.answers.max_bytes_per_answer_value, 64);
        assert!(!config.events.enabled);

        clear_env();
    }

    #[test]
    fn test_merge_field_by_field() {
        let base = Config {
            answers: AnswersConfig {
                rule_stats_limit: 9,
                ..AnswersConfig::default()
            },
            ..Config::default()
        };
        let other = Config {
            improvements: ImprovementsConfig {
                tie_break: "incomplete".to_string(),
                ..ImprovementsConfig::default()
            },
            ..Config::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.answers.rule_stats_limit, 9);
        assert_eq!(merged.improvements.tie_break, "incomplete");
    }

    #[test]
    fn test_policy_from_config() {
        let config = ImprovementsConfig {
            threshold_ratio: 0.25,
            tie_break: "incomplete".to_string(),
        };
        let policy = config.policy();
        assert!((policy.threshold_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(policy.tie_break, TieBreak::Incomplete);
    }

    #[test]
    fn test_policy_invalid_values_fall_back() {
        let config = ImprovementsConfig {
            threshold_ratio: 0.0,
            tie_break: "sideways".to_string(),
        };
        assert_eq!(config.policy(), RankingPolicy::default());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[events]\nenabled = false\n").unwrap();
        assert!(!config.events.enabled);
        assert_eq!(config.answers, AnswersConfig::default());
        assert_eq!(config.improvements, ImprovementsConfig::default());
    }

    #[test]
    #[serial]
    fn test_tally_home_with_env() {
        let dir = TempDir::new().unwrap();
        env::set_var("TALLY_HOME", dir.path());

        assert_eq!(tally_home().unwrap(), dir.path());

        env::remove_var("TALLY_HOME");
    }

    #[test]
    #[serial]
    fn test_tally_home_empty_env() {
        env::set_var("TALLY_HOME", "");

        let home = tally_home();
        assert!(home.is_some());
        assert!(home.unwrap().ends_with(".tally"));

        env::remove_var("TALLY_HOME");
    }

    #[test]
    fn test_find_project_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".tally")).unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), dir.path());
    }

    #[test]
    #[serial]
    fn test_data_dir_prefers_project() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".tally")).unwrap();

        assert_eq!(data_dir(dir.path()).unwrap(), dir.path().join(".tally"));
    }

    #[test]
    #[serial]
    fn test_data_dir_falls_back_to_home() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        env::set_var("TALLY_HOME", home.path());

        assert_eq!(data_dir(project.path()).unwrap(), home.path().join("data"));

        env::remove_var("TALLY_HOME");
    }

    #[test]
    fn test_events_log_path() {
        assert_eq!(
            events_log_path(Path::new("/data")),
            PathBuf::from("/data/events.log")
        );
    }
}
