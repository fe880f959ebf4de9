//! `tasks/planner_state.json`: the initiative ledger and per-day rate
//! counters the planner persists between cycles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiativeStatus {
    Active,
    WaitingResponse,
    Planned,
    Completed,
    Abandoned,
}

impl InitiativeStatus {
    pub fn is_open(self) -> bool {
        !matches!(self, InitiativeStatus::Completed | InitiativeStatus::Abandoned)
    }

    pub fn is_live(self) -> bool {
        matches!(self, InitiativeStatus::Active | InitiativeStatus::WaitingResponse | InitiativeStatus::Planned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiative {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub contract_id: String,
    pub priority_score: f64,
    pub status: InitiativeStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
    #[serde(default)]
    pub waiting_for: Vec<String>,
    #[serde(default)]
    pub actions_taken: Vec<serde_json::Value>,
    #[serde(default)]
    pub last_external_activity_at: Option<String>,
    #[serde(default)]
    pub next_action_after: Option<String>,
    #[serde(default)]
    pub actions_today: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyStats {
    #[serde(default)]
    pub threads_started: u32,
    #[serde(default)]
    pub messages_sent: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerState {
    #[serde(default)]
    pub initiatives: Vec<Initiative>,
    #[serde(default)]
    pub daily_stats: HashMap<String, DailyStats>,
    #[serde(default)]
    pub cooldowns: HashMap<String, String>,
    #[serde(default)]
    pub last_plan_at: Option<String>,
}

pub const PLANNER_STATE_PATH: &str = "tasks/planner_state.json";
pub const PLANNER_LOG_PATH: &str = "tasks/planner_log.jsonl";

pub fn load(store: &dyn covenant_store::Store) -> crate::error::Result<PlannerState> {
    let Some(value) = store.read_json_value(PLANNER_STATE_PATH)? else { return Ok(PlannerState::default()) };
    Ok(serde_json::from_value(value).unwrap_or_default())
}

pub fn save(store: &dyn covenant_store::Store, state: &PlannerState) -> crate::error::Result<()> {
    store.write_json_value(PLANNER_STATE_PATH, &serde_json::to_value(state).unwrap_or_default())?;
    Ok(())
}

pub fn append_log(store: &dyn covenant_store::Store, entry: serde_json::Value) {
    if let Err(e) = store.append_jsonl_value(PLANNER_LOG_PATH, &entry) {
        tracing::warn!(error = %e, "failed to append planner log entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_store::FileTreeStore;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        (dir, store)
    }

    #[test]
    fn load_on_missing_file_returns_default() {
        let (_dir, s) = store();
        let state = load(&s).unwrap();
        assert!(state.initiatives.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, s) = store();
        let mut state = PlannerState::default();
        state.last_plan_at = Some("2026-08-01T09:00:00Z".to_string());
        save(&s, &state).unwrap();
        let loaded = load(&s).unwrap();
        assert_eq!(loaded.last_plan_at, state.last_plan_at);
    }
}
