//! Contract status transitions. The allowed set mirrors
//! `covenant_core::LifecycleStatus`; this module is the only place that
//! writes `status`/`status_updated_at` into `contracts/index.json`.

use std::str::FromStr;

use chrono::Utc;
use covenant_core::LifecycleStatus;
use covenant_store::error::Result;
use covenant_store::Store;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdateResult {
    pub ok: bool,
    pub changed: bool,
    pub message: String,
}

/// Sets `contract_id`'s status, creating a minimal index record if none
/// exists yet. A no-op (still `ok`) if the status is already the target.
pub fn set_status(store: &dyn Store, contract_id: &str, status: &str) -> Result<StatusUpdateResult> {
    if LifecycleStatus::from_str(status).is_err() {
        return Ok(StatusUpdateResult {
            ok: false,
            changed: false,
            message: format!("Invalid status: {status}"),
        });
    }

    let cid = contract_id.trim().to_lowercase();
    if cid.is_empty() {
        return Ok(StatusUpdateResult { ok: false, changed: false, message: "Missing contract_id".to_string() });
    }

    let contracts = store.list_contracts()?;
    let prev = contracts.iter().find(|c| c.id == cid).and_then(|c| c.status.clone());
    if prev.as_deref() == Some(status) {
        return Ok(StatusUpdateResult { ok: true, changed: false, message: format!("Status already {status}") });
    }

    let mut patch = serde_json::Map::new();
    patch.insert("status".to_string(), json!(status));
    patch.insert("status_updated_at".to_string(), json!(Utc::now().format("%Y-%m-%d").to_string()));
    if prev.is_none() {
        patch.insert("name".to_string(), json!(cid.clone()));
    }
    store.update_contract_index(&cid, patch)?;

    let message = match prev {
        Some(p) => format!("Status {p} -> {status}"),
        None => format!("Created contract with status {status}"),
    };
    Ok(StatusUpdateResult { ok: true, changed: true, message })
}

/// Promotes `contract_id` to `in_review` if it has no status yet or is
/// still `draft`; otherwise a no-op.
pub fn ensure_in_review(store: &dyn Store, contract_id: &str) -> Result<StatusUpdateResult> {
    let cid = contract_id.trim().to_lowercase();
    if cid.is_empty() {
        return Ok(StatusUpdateResult { ok: false, changed: false, message: "Missing contract_id".to_string() });
    }

    let contracts = store.list_contracts()?;
    let current = contracts.iter().find(|c| c.id == cid).and_then(|c| c.status.clone());
    match current.as_deref() {
        None | Some("") | Some("draft") => set_status(store, &cid, "in_review"),
        Some(st) => Ok(StatusUpdateResult { ok: true, changed: false, message: format!("Status already {st}") }),
    }
}

#[cfg(test)]
mod tests {
    use covenant_store::FileTreeStore;

    use super::*;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        (dir, store)
    }

    #[test]
    fn rejects_unknown_status() {
        let (_dir, store) = store();
        let result = set_status(&store, "mau", "bogus").unwrap();
        assert!(!result.ok);
    }

    #[test]
    fn creates_a_minimal_record_when_absent() {
        let (_dir, store) = store();
        let result = set_status(&store, "mau", "in_review").unwrap();
        assert!(result.ok && result.changed);
        let contracts = store.list_contracts().unwrap();
        assert_eq!(contracts[0].status.as_deref(), Some("in_review"));
    }

    #[test]
    fn repeating_the_same_status_is_a_noop() {
        let (_dir, store) = store();
        set_status(&store, "mau", "in_review").unwrap();
        let result = set_status(&store, "mau", "in_review").unwrap();
        assert!(result.ok && !result.changed);
    }

    #[test]
    fn ensure_in_review_promotes_draft_but_not_active() {
        let (_dir, store) = store();
        set_status(&store, "mau", "draft").unwrap();
        let result = ensure_in_review(&store, "mau").unwrap();
        assert!(result.changed);
        assert_eq!(store.list_contracts().unwrap()[0].status.as_deref(), Some("in_review"));

        set_status(&store, "mau", "active").unwrap();
        let result = ensure_in_review(&store, "mau").unwrap();
        assert!(!result.changed);
    }
}
