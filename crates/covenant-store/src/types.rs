use serde::{Deserialize, Serialize};

/// One row of `contracts/index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractIndexEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreed_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_file: Option<String>,
    /// Any other fields callers stash in the index (merged, never dropped).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractIndex {
    #[serde(default)]
    pub contracts: Vec<ContractIndexEntry>,
}

/// One row of `contracts/versions/<id>/history.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    pub ts: String,
    pub kind: String,
    pub sha256: String,
    pub bytes: usize,
}

/// One row of `participants/index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParticipantIndex {
    #[serde(default)]
    pub participants: Vec<ParticipantEntry>,
}

/// One row of `tasks/reminders.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub contract_id: String,
    pub target_user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_mm_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_summary: Option<String>,
    #[serde(default = "default_escalation_step")]
    pub escalation_step: u8,
    pub next_reminder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_asked: Option<String>,
}

fn default_escalation_step() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemindersFile {
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

/// One row of `tasks/queue.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub contract_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueFile {
    #[serde(default)]
    pub queue: Vec<QueueItem>,
}

/// One row of `tasks/suggestions.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub id: String,
    pub contract_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
    pub trigger: String,
    pub suggested_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SuggestionsFile {
    #[serde(default)]
    pub suggestions: Vec<SuggestionRecord>,
}
