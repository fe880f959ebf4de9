use chrono::Utc;
use covenant_core::time::version_timestamp;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::fs::FileTree;
use crate::types::{
    ContractIndex, ContractIndexEntry, ParticipantEntry, ParticipantIndex, QueueFile, QueueItem,
    Reminder, RemindersFile, SuggestionRecord, SuggestionsFile, VersionHistoryEntry,
};

/// The persistence surface every other crate depends on. A POSIX file tree
/// is the only implementation shipped, but callers program against this
/// trait so a different KV backend could stand in without touching callers.
pub trait Store: Send + Sync {
    fn read_file(&self, rel: &str) -> Result<Option<String>>;
    fn write_file(&self, rel: &str, content: &str) -> Result<()>;
    fn read_json_value(&self, rel: &str) -> Result<Option<serde_json::Value>>;
    fn write_json_value(&self, rel: &str, value: &serde_json::Value) -> Result<()>;
    fn append_jsonl_value(&self, rel: &str, value: &serde_json::Value) -> Result<()>;
    fn read_jsonl_values(&self, rel: &str) -> Result<Vec<serde_json::Value>>;

    fn list_contracts(&self) -> Result<Vec<ContractIndexEntry>>;
    fn get_contract(&self, contract_id: &str) -> Result<Option<String>>;
    fn save_contract(&self, contract_id: &str, content: &str) -> Result<()>;
    fn get_contract_history(&self, contract_id: &str) -> Result<Vec<VersionHistoryEntry>>;
    fn get_contract_version(&self, contract_id: &str, ts: &str) -> Result<Option<String>>;
    fn update_contract_index(
        &self,
        contract_id: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;

    fn save_draft(&self, contract_id: &str, content: &str) -> Result<()>;
    fn get_draft(&self, contract_id: &str) -> Result<Option<String>>;
    fn update_discussion(&self, contract_id: &str, summary: &serde_json::Value) -> Result<()>;
    fn get_discussion(&self, contract_id: &str) -> Result<Option<serde_json::Value>>;

    fn get_participant(&self, username: &str) -> Result<Option<String>>;
    fn update_participant(&self, username: &str, content: &str) -> Result<()>;
    fn list_participants(&self, active_only: bool) -> Result<Vec<String>>;
    fn upsert_participant_index(
        &self,
        username: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;
    fn set_participant_active(&self, username: &str, active: bool) -> Result<()>;
    fn is_participant_active(&self, username: &str) -> Result<bool>;
    fn is_participant_onboarded(&self, username: &str) -> Result<bool>;
    fn set_participant_onboarded(&self, username: &str, onboarded: bool) -> Result<()>;

    fn save_decision(&self, data: serde_json::Value) -> Result<()>;

    fn get_reminders(&self) -> Result<Vec<Reminder>>;
    fn save_reminders(&self, reminders: &[Reminder]) -> Result<()>;

    fn get_queue(&self) -> Result<Vec<QueueItem>>;
    fn save_queue(&self, queue: &[QueueItem]) -> Result<()>;

    fn get_suggestions(&self) -> Result<Vec<SuggestionRecord>>;
    fn save_suggestions(&self, suggestions: &[SuggestionRecord]) -> Result<()>;

    fn load_files(&self, paths: &[&str]) -> Result<String>;
}

/// POSIX file-tree backed [`Store`]. All mutation goes through
/// [`FileTree`]'s temp-write-then-rename path with retry/backoff, matching
/// the atomicity expectations callers rely on.
pub struct FileTreeStore {
    tree: FileTree,
}

impl FileTreeStore {
    pub fn new(base_dir: impl Into<std::path::PathBuf>, max_retries: u32, backoff_base: f64) -> Self {
        Self {
            tree: FileTree::new(base_dir, max_retries, backoff_base),
        }
    }

    fn contract_path(contract_id: &str) -> String {
        format!("contracts/{contract_id}.md")
    }

    fn versions_dir(contract_id: &str) -> String {
        format!("contracts/versions/{contract_id}")
    }

    fn history_path(contract_id: &str) -> String {
        format!("contracts/versions/{contract_id}/history.jsonl")
    }
}

impl Store for FileTreeStore {
    fn read_file(&self, rel: &str) -> Result<Option<String>> {
        self.tree.read_file(rel)
    }

    fn write_file(&self, rel: &str, content: &str) -> Result<()> {
        self.tree.write_file(rel, content)
    }

    fn read_json_value(&self, rel: &str) -> Result<Option<serde_json::Value>> {
        self.tree.read_json(rel)
    }

    fn write_json_value(&self, rel: &str, value: &serde_json::Value) -> Result<()> {
        self.tree.write_json(rel, value)
    }

    fn append_jsonl_value(&self, rel: &str, value: &serde_json::Value) -> Result<()> {
        self.tree.append_jsonl(rel, value)
    }

    fn read_jsonl_values(&self, rel: &str) -> Result<Vec<serde_json::Value>> {
        self.tree.read_jsonl(rel)
    }

    fn list_contracts(&self) -> Result<Vec<ContractIndexEntry>> {
        let idx: Option<ContractIndex> = self.tree.read_json("contracts/index.json")?;
        Ok(idx.map(|i| i.contracts).unwrap_or_default())
    }

    fn get_contract(&self, contract_id: &str) -> Result<Option<String>> {
        self.tree.read_file(&Self::contract_path(contract_id))
    }

    /// Writes the new content as current, snapshots it as `<ts>.md`, and
    /// (if a previous version existed) snapshots that as `<ts>_prev.md` —
    /// all three as one staged batch, so a crash never leaves `current`
    /// updated without its matching `<ts>.md`. History entries are appended
    /// afterward, previous before current, matching the reference order.
    fn save_contract(&self, contract_id: &str, content: &str) -> Result<()> {
        let current_path = Self::contract_path(contract_id);
        let prev = self.tree.read_file(&current_path)?;
        let ts = version_timestamp(Utc::now());
        let versions_dir = Self::versions_dir(contract_id);
        let history_path = Self::history_path(contract_id);
        let ts_snapshot_path = format!("{versions_dir}/{ts}.md");
        let prev_ts = format!("{ts}_prev");
        let prev_snapshot_path = format!("{versions_dir}/{prev_ts}.md");

        let mut batch: Vec<(&str, &str)> = vec![(current_path.as_str(), content), (ts_snapshot_path.as_str(), content)];
        if let Some(prev_content) = prev.as_deref() {
            batch.push((prev_snapshot_path.as_str(), prev_content));
        }
        self.tree.write_batch(&batch)?;

        if let Some(prev_content) = prev {
            self.tree.append_jsonl(
                &history_path,
                &serde_json::to_value(VersionHistoryEntry {
                    ts: prev_ts,
                    kind: "previous".to_string(),
                    sha256: FileTree::sha256(&prev_content),
                    bytes: prev_content.len(),
                })
                .map_err(|source| StoreError::Json {
                    path: history_path.clone(),
                    source,
                })?,
            )?;
        }
        self.tree.append_jsonl(
            &history_path,
            &serde_json::to_value(VersionHistoryEntry {
                ts,
                kind: "current".to_string(),
                sha256: FileTree::sha256(content),
                bytes: content.len(),
            })
            .map_err(|source| StoreError::Json {
                path: history_path.clone(),
                source,
            })?,
        )?;

        debug!(contract_id, "saved contract");
        Ok(())
    }

    fn get_contract_history(&self, contract_id: &str) -> Result<Vec<VersionHistoryEntry>> {
        let values = self.tree.read_jsonl(&Self::history_path(contract_id))?;
        Ok(values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    fn get_contract_version(&self, contract_id: &str, ts: &str) -> Result<Option<String>> {
        self.tree
            .read_file(&format!("{}/{ts}.md", Self::versions_dir(contract_id)))
    }

    fn update_contract_index(
        &self,
        contract_id: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut index: ContractIndex = self
            .tree
            .read_json("contracts/index.json")?
            .unwrap_or_default();

        let mut patch = patch;
        let history_path = Self::history_path(contract_id);
        if self.tree.read_file(&history_path)?.is_some() {
            patch.insert(
                "versions_dir".to_string(),
                serde_json::Value::String(Self::versions_dir(contract_id)),
            );
            patch.insert(
                "history_file".to_string(),
                serde_json::Value::String(history_path),
            );
        }

        let found = index.contracts.iter_mut().find(|c| c.id == contract_id);
        match found {
            Some(entry) => merge_entry_patch(entry, patch),
            None => {
                let mut entry: ContractIndexEntry = serde_json::from_value(serde_json::json!({
                    "id": contract_id,
                }))
                .map_err(|source| StoreError::Json {
                    path: "contracts/index.json".to_string(),
                    source,
                })?;
                merge_entry_patch(&mut entry, patch);
                index.contracts.push(entry);
            }
        }

        self.tree.write_json("contracts/index.json", &index)
    }

    fn save_draft(&self, contract_id: &str, content: &str) -> Result<()> {
        self.tree
            .write_file(&format!("drafts/{contract_id}.md"), content)
    }

    fn get_draft(&self, contract_id: &str) -> Result<Option<String>> {
        self.tree.read_file(&format!("drafts/{contract_id}.md"))
    }

    fn update_discussion(&self, contract_id: &str, summary: &serde_json::Value) -> Result<()> {
        self.tree
            .write_json(&format!("drafts/{contract_id}_discussion.json"), summary)
    }

    fn get_discussion(&self, contract_id: &str) -> Result<Option<serde_json::Value>> {
        self.tree
            .read_json(&format!("drafts/{contract_id}_discussion.json"))
    }

    fn get_participant(&self, username: &str) -> Result<Option<String>> {
        self.tree.read_file(&format!("participants/{username}.md"))
    }

    fn update_participant(&self, username: &str, content: &str) -> Result<()> {
        self.tree
            .write_file(&format!("participants/{username}.md"), content)
    }

    fn list_participants(&self, active_only: bool) -> Result<Vec<String>> {
        let idx: Option<ParticipantIndex> = self.tree.read_json("participants/index.json")?;
        if let Some(idx) = idx {
            return Ok(idx
                .participants
                .into_iter()
                .filter(|p| !active_only || p.active != Some(false))
                .map(|p| p.username)
                .collect());
        }
        self.tree.list_dir_stems("participants", ".md")
    }

    fn upsert_participant_index(
        &self,
        username: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut idx: ParticipantIndex = self
            .tree
            .read_json("participants/index.json")?
            .unwrap_or_default();

        let found = idx
            .participants
            .iter_mut()
            .find(|p| p.username == username);
        match found {
            Some(entry) => merge_participant_patch(entry, patch),
            None => {
                let mut entry = ParticipantEntry {
                    username: username.to_string(),
                    active: None,
                    onboarded: None,
                    joined_at: None,
                    left_at: None,
                    extra: serde_json::Map::new(),
                };
                merge_participant_patch(&mut entry, patch);
                idx.participants.push(entry);
            }
        }

        self.tree.write_json("participants/index.json", &idx)
    }

    fn set_participant_active(&self, username: &str, active: bool) -> Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut patch = serde_json::Map::new();
        patch.insert("active".to_string(), serde_json::Value::Bool(active));

        let existing = self
            .tree
            .read_json::<ParticipantIndex>("participants/index.json")?
            .and_then(|idx| idx.participants.into_iter().find(|p| p.username == username));

        if active {
            let already_joined = existing.as_ref().and_then(|p| p.joined_at.clone());
            patch.insert(
                "joined_at".to_string(),
                serde_json::Value::String(already_joined.unwrap_or(today)),
            );
            patch.insert("left_at".to_string(), serde_json::Value::Null);
        } else {
            let already_left = existing.as_ref().and_then(|p| p.left_at.clone());
            patch.insert(
                "left_at".to_string(),
                serde_json::Value::String(already_left.unwrap_or(today)),
            );
        }

        self.upsert_participant_index(username, patch)
    }

    fn is_participant_active(&self, username: &str) -> Result<bool> {
        let idx: Option<ParticipantIndex> = self.tree.read_json("participants/index.json")?;
        let Some(idx) = idx else { return Ok(true) };
        Ok(idx
            .participants
            .iter()
            .find(|p| p.username == username)
            .map(|p| p.active != Some(false))
            .unwrap_or(true))
    }

    fn is_participant_onboarded(&self, username: &str) -> Result<bool> {
        let idx: Option<ParticipantIndex> = self.tree.read_json("participants/index.json")?;
        let Some(idx) = idx else { return Ok(false) };
        Ok(idx
            .participants
            .iter()
            .find(|p| p.username == username)
            .map(|p| p.onboarded == Some(true))
            .unwrap_or(false))
    }

    fn set_participant_onboarded(&self, username: &str, onboarded: bool) -> Result<()> {
        let mut patch = serde_json::Map::new();
        patch.insert(
            "onboarded".to_string(),
            serde_json::Value::Bool(onboarded),
        );
        self.upsert_participant_index(username, patch)
    }

    fn save_decision(&self, data: serde_json::Value) -> Result<()> {
        let mut data = data;
        if let serde_json::Value::Object(map) = &mut data {
            map.entry("date")
                .or_insert_with(|| serde_json::Value::String(Utc::now().format("%Y-%m-%d").to_string()));
        }
        self.tree.append_jsonl("memory/decisions.jsonl", &data)
    }

    fn get_reminders(&self) -> Result<Vec<Reminder>> {
        let data: Option<RemindersFile> = self.tree.read_json("tasks/reminders.json")?;
        Ok(data.map(|d| d.reminders).unwrap_or_default())
    }

    fn save_reminders(&self, reminders: &[Reminder]) -> Result<()> {
        self.tree.write_json(
            "tasks/reminders.json",
            &RemindersFile {
                reminders: reminders.to_vec(),
            },
        )
    }

    fn get_queue(&self) -> Result<Vec<QueueItem>> {
        let data: Option<QueueFile> = self.tree.read_json("tasks/queue.json")?;
        Ok(data.map(|d| d.queue).unwrap_or_default())
    }

    fn save_queue(&self, queue: &[QueueItem]) -> Result<()> {
        self.tree.write_json(
            "tasks/queue.json",
            &QueueFile {
                queue: queue.to_vec(),
            },
        )
    }

    fn get_suggestions(&self) -> Result<Vec<SuggestionRecord>> {
        let data: Option<SuggestionsFile> = self.tree.read_json("tasks/suggestions.json")?;
        Ok(data.map(|d| d.suggestions).unwrap_or_default())
    }

    fn save_suggestions(&self, suggestions: &[SuggestionRecord]) -> Result<()> {
        self.tree.write_json(
            "tasks/suggestions.json",
            &SuggestionsFile {
                suggestions: suggestions.to_vec(),
            },
        )
    }

    fn load_files(&self, paths: &[&str]) -> Result<String> {
        let mut parts = Vec::new();
        for p in paths {
            if let Some(content) = self.tree.read_file(p)? {
                parts.push(format!("--- {p} ---\n{content}"));
            }
        }
        Ok(parts.join("\n\n"))
    }
}

fn merge_entry_patch(
    entry: &mut ContractIndexEntry,
    patch: serde_json::Map<String, serde_json::Value>,
) {
    let mut value = serde_json::to_value(&*entry).unwrap_or(serde_json::json!({}));
    if let serde_json::Value::Object(map) = &mut value {
        for (k, v) in patch {
            map.insert(k, v);
        }
    }
    if let Ok(updated) = serde_json::from_value(value) {
        *entry = updated;
    }
}

fn merge_participant_patch(
    entry: &mut ParticipantEntry,
    patch: serde_json::Map<String, serde_json::Value>,
) {
    let mut value = serde_json::to_value(&*entry).unwrap_or(serde_json::json!({}));
    if let serde_json::Value::Object(map) = &mut value {
        for (k, v) in patch {
            map.insert(k, v);
        }
    }
    if let Ok(updated) = serde_json::from_value(value) {
        *entry = updated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.0);
        (dir, store)
    }

    #[test]
    fn save_contract_versions_previous_before_writing_current() {
        let (_dir, store) = store();
        store.save_contract("mau", "# v1").unwrap();
        store.save_contract("mau", "# v2").unwrap();

        assert_eq!(store.get_contract("mau").unwrap().as_deref(), Some("# v2"));
        let history = store.get_contract_history("mau").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].kind, "current");
        assert_eq!(history[1].kind, "previous");
        assert_eq!(history[2].kind, "current");
    }

    #[test]
    fn participant_defaults_are_permissive() {
        let (_dir, store) = store();
        assert!(store.is_participant_active("nobody").unwrap());
        assert!(!store.is_participant_onboarded("nobody").unwrap());
    }

    #[test]
    fn set_participant_active_round_trips() {
        let (_dir, store) = store();
        store.set_participant_active("pavel", true).unwrap();
        assert!(store.is_participant_active("pavel").unwrap());
        store.set_participant_active("pavel", false).unwrap();
        assert!(!store.is_participant_active("pavel").unwrap());
    }

    #[test]
    fn update_contract_index_merges_not_replaces() {
        let (_dir, store) = store();
        let mut patch = serde_json::Map::new();
        patch.insert("status".into(), serde_json::json!("draft"));
        store.update_contract_index("mau", patch).unwrap();

        let mut patch2 = serde_json::Map::new();
        patch2.insert("tier".into(), serde_json::json!("tier_1"));
        store.update_contract_index("mau", patch2).unwrap();

        let contracts = store.list_contracts().unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].status.as_deref(), Some("draft"));
        assert_eq!(contracts[0].tier.as_deref(), Some("tier_1"));
    }
}
