use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// All tunable runtime settings, loaded once at startup and handed around as
/// an immutable value. Environment variable names are kept exactly as named
/// in the external interface contract — they are not given a shared prefix
/// because operators already depend on the literal names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    // Thread context
    #[serde(default = "default_thread_max_messages")]
    pub thread_max_messages: usize,
    #[serde(default = "default_thread_max_chars")]
    pub thread_max_chars: usize,
    #[serde(default = "default_thread_ttl_days")]
    pub thread_ttl_days: i64,

    // Listener dedup
    #[serde(default = "default_dedup_ttl_seconds")]
    pub dedup_ttl_seconds: i64,
    #[serde(default = "default_dedup_max_entries")]
    pub dedup_max_entries: usize,

    // Store I/O
    #[serde(default = "default_write_max_retries")]
    pub write_max_retries: u32,
    #[serde(default = "default_write_backoff_base")]
    pub write_backoff_base: f64,

    // Scheduler / reminders
    #[serde(default = "default_reminder_default_interval_days")]
    pub reminder_default_interval_days: i64,
    #[serde(default = "default_reminder_check_hours")]
    pub reminder_check_hours: i64,

    // Governance
    #[serde(default = "default_governance_review_threshold_days")]
    pub governance_review_threshold_days: i64,

    // Suggestion engine
    #[serde(default = "default_suggestion_cooldown_days")]
    pub suggestion_cooldown_days: i64,
    #[serde(default = "default_suggestion_dismiss_cooldown_days")]
    pub suggestion_dismiss_cooldown_days: i64,
    #[serde(default = "default_suggestion_max_per_day")]
    pub suggestion_max_per_day: usize,

    // Planner
    #[serde(default = "default_planner_run_time")]
    pub planner_run_time: String,
    #[serde(default = "default_planner_workdays")]
    pub planner_workdays: Vec<u8>,
    #[serde(default = "default_planner_max_active_initiatives")]
    pub planner_max_active_initiatives: usize,
    #[serde(default = "default_planner_max_new_threads_per_day")]
    pub planner_max_new_threads_per_day: usize,
    #[serde(default = "default_planner_max_messages_per_day")]
    pub planner_max_messages_per_day: usize,
    #[serde(default = "default_planner_max_actions_per_initiative_per_day")]
    pub planner_max_actions_per_initiative_per_day: usize,
    #[serde(default = "default_planner_cooldown_hours")]
    pub planner_cooldown_hours: i64,
    #[serde(default = "default_planner_wait_before_followup_hours")]
    pub planner_wait_before_followup_hours: i64,
    #[serde(default = "default_planner_stale_initiative_days")]
    pub planner_stale_initiative_days: i64,

    // LLM
    #[serde(default = "default_llm_timeout_seconds")]
    pub llm_timeout_seconds: u64,
    #[serde(default = "default_llm_cheap_provider")]
    pub llm_cheap_provider: String,
    #[serde(default = "default_llm_cheap_model")]
    pub llm_cheap_model: String,
    #[serde(default = "default_llm_heavy_provider")]
    pub llm_heavy_provider: String,
    #[serde(default = "default_llm_heavy_model")]
    pub llm_heavy_model: String,
    #[serde(default)]
    pub anthropic_api_key: String,
    #[serde(default)]
    pub anthropic_base_url: Option<String>,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default = "default_llm_max_tool_iterations")]
    pub llm_max_tool_iterations: usize,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_backoff_base")]
    pub llm_retry_backoff_base: f64,

    #[serde(default = "default_escalation_user")]
    pub escalation_user: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            thread_max_messages: default_thread_max_messages(),
            thread_max_chars: default_thread_max_chars(),
            thread_ttl_days: default_thread_ttl_days(),
            dedup_ttl_seconds: default_dedup_ttl_seconds(),
            dedup_max_entries: default_dedup_max_entries(),
            write_max_retries: default_write_max_retries(),
            write_backoff_base: default_write_backoff_base(),
            reminder_default_interval_days: default_reminder_default_interval_days(),
            reminder_check_hours: default_reminder_check_hours(),
            governance_review_threshold_days: default_governance_review_threshold_days(),
            suggestion_cooldown_days: default_suggestion_cooldown_days(),
            suggestion_dismiss_cooldown_days: default_suggestion_dismiss_cooldown_days(),
            suggestion_max_per_day: default_suggestion_max_per_day(),
            planner_run_time: default_planner_run_time(),
            planner_workdays: default_planner_workdays(),
            planner_max_active_initiatives: default_planner_max_active_initiatives(),
            planner_max_new_threads_per_day: default_planner_max_new_threads_per_day(),
            planner_max_messages_per_day: default_planner_max_messages_per_day(),
            planner_max_actions_per_initiative_per_day:
                default_planner_max_actions_per_initiative_per_day(),
            planner_cooldown_hours: default_planner_cooldown_hours(),
            planner_wait_before_followup_hours: default_planner_wait_before_followup_hours(),
            planner_stale_initiative_days: default_planner_stale_initiative_days(),
            llm_timeout_seconds: default_llm_timeout_seconds(),
            llm_cheap_provider: default_llm_cheap_provider(),
            llm_cheap_model: default_llm_cheap_model(),
            llm_heavy_provider: default_llm_heavy_provider(),
            llm_heavy_model: default_llm_heavy_model(),
            anthropic_api_key: String::new(),
            anthropic_base_url: None,
            openai_api_key: String::new(),
            openai_base_url: None,
            llm_max_tool_iterations: default_llm_max_tool_iterations(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_backoff_base: default_llm_retry_backoff_base(),
            escalation_user: default_escalation_user(),
        }
    }
}

fn default_data_dir() -> String {
    ".".to_string()
}
fn default_thread_max_messages() -> usize {
    15
}
fn default_thread_max_chars() -> usize {
    4000
}
fn default_thread_ttl_days() -> i64 {
    7
}
fn default_dedup_ttl_seconds() -> i64 {
    86_400
}
fn default_dedup_max_entries() -> usize {
    4000
}
fn default_write_max_retries() -> u32 {
    3
}
fn default_write_backoff_base() -> f64 {
    0.5
}
fn default_reminder_default_interval_days() -> i64 {
    2
}
fn default_reminder_check_hours() -> i64 {
    4
}
fn default_governance_review_threshold_days() -> i64 {
    180
}
fn default_suggestion_cooldown_days() -> i64 {
    14
}
fn default_suggestion_dismiss_cooldown_days() -> i64 {
    30
}
fn default_suggestion_max_per_day() -> usize {
    1
}
fn default_planner_run_time() -> String {
    "09:00".to_string()
}
fn default_planner_workdays() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}
fn default_planner_max_active_initiatives() -> usize {
    3
}
fn default_planner_max_new_threads_per_day() -> usize {
    2
}
fn default_planner_max_messages_per_day() -> usize {
    8
}
fn default_planner_max_actions_per_initiative_per_day() -> usize {
    2
}
fn default_planner_cooldown_hours() -> i64 {
    48
}
fn default_planner_wait_before_followup_hours() -> i64 {
    24
}
fn default_planner_stale_initiative_days() -> i64 {
    14
}
fn default_llm_timeout_seconds() -> u64 {
    120
}
fn default_llm_cheap_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_cheap_model() -> String {
    "claude-haiku-4-5".to_string()
}
fn default_llm_heavy_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_heavy_model() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_llm_max_tool_iterations() -> usize {
    25
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_retry_backoff_base() -> f64 {
    1.0
}
fn default_escalation_user() -> String {
    "alexey".to_string()
}

impl Config {
    /// Load configuration: built-in defaults, then an optional TOML file,
    /// then process environment variables (highest precedence).
    pub fn load(toml_path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        let path = toml_path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"));
        if path.exists() {
            figment = figment.merge(Toml::file(&path));
        }

        figment = figment.merge(Env::raw());

        figment
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_interface() {
        let cfg = Config::default();
        assert_eq!(cfg.thread_max_messages, 15);
        assert_eq!(cfg.reminder_check_hours, 4);
        assert_eq!(cfg.planner_run_time, "09:00");
        assert_eq!(cfg.escalation_user, "alexey");
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("THREAD_MAX_MESSAGES", "42");
        let cfg = Config::load(Some("/nonexistent/config.toml")).unwrap();
        assert_eq!(cfg.thread_max_messages, 42);
        std::env::remove_var("THREAD_MAX_MESSAGES");
    }
}
