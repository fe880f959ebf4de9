//! `tasks/active_threads.json`: maps a contract id to the chat thread its
//! ongoing discussion is attached to. Reads do not refresh `updated_at` —
//! only an explicit `set_active_thread` call does.

use chrono::{DateTime, Utc};
use covenant_store::Store;
use tracing::debug;

use crate::error::Result;
use crate::types::{ActiveThreadEntry, ActiveThreadsFile};

const ACTIVE_THREADS_PATH: &str = "tasks/active_threads.json";

/// Returns the registered thread root for `contract_id` if one exists and
/// is still within `ttl_days` of its last update.
pub fn get_active_thread(store: &dyn Store, contract_id: &str, ttl_days: i64) -> Result<Option<String>> {
    let Some(value) = store.read_json_value(ACTIVE_THREADS_PATH)? else { return Ok(None) };
    let Ok(file) = serde_json::from_value::<ActiveThreadsFile>(value) else {
        debug!(contract_id, "active_threads.json is malformed; treating as absent");
        return Ok(None);
    };
    let Some(entry) = file.threads.get(contract_id) else { return Ok(None) };

    let Ok(updated_at) = DateTime::parse_from_rfc3339(&entry.updated_at) else { return Ok(None) };
    let age = Utc::now().signed_duration_since(updated_at.with_timezone(&Utc));
    if age.num_days() > ttl_days {
        debug!(contract_id, age_days = age.num_days(), ttl_days, "active thread expired");
        return Ok(None);
    }

    Ok(Some(entry.root_post_id.clone()))
}

/// Registers (or overwrites) `contract_id`'s active thread root, stamping
/// `updated_at` to now.
pub fn set_active_thread(store: &dyn Store, contract_id: &str, root_post_id: &str) -> Result<()> {
    let mut file: ActiveThreadsFile = store
        .read_json_value(ACTIVE_THREADS_PATH)?
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    file.threads.insert(
        contract_id.to_string(),
        ActiveThreadEntry { root_post_id: root_post_id.to_string(), updated_at: Utc::now().to_rfc3339() },
    );

    store.write_json_value(ACTIVE_THREADS_PATH, &serde_json::to_value(&file).expect("serializable"))?;
    Ok(())
}

/// Drops every registry entry whose `updated_at` exceeds `ttl_days`,
/// returning how many were removed.
pub fn gc_expired(store: &dyn Store, ttl_days: i64) -> Result<usize> {
    let Some(value) = store.read_json_value(ACTIVE_THREADS_PATH)? else { return Ok(0) };
    let Ok(mut file) = serde_json::from_value::<ActiveThreadsFile>(value) else { return Ok(0) };

    let now = Utc::now();
    let before = file.threads.len();
    file.threads.retain(|_, entry| {
        DateTime::parse_from_rfc3339(&entry.updated_at)
            .map(|dt| now.signed_duration_since(dt.with_timezone(&Utc)).num_days() <= ttl_days)
            .unwrap_or(false)
    });
    let removed = before - file.threads.len();

    if removed > 0 {
        store.write_json_value(ACTIVE_THREADS_PATH, &serde_json::to_value(&file).expect("serializable"))?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use covenant_store::FileTreeStore;

    use super::*;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        (dir, store)
    }

    #[test]
    fn roundtrips_through_set_and_get() {
        let (_dir, store) = store();
        set_active_thread(&store, "headcount", "root_abc").unwrap();
        assert_eq!(get_active_thread(&store, "headcount", 7).unwrap(), Some("root_abc".to_string()));
    }

    #[test]
    fn missing_file_returns_none() {
        let (_dir, store) = store();
        assert_eq!(get_active_thread(&store, "headcount", 7).unwrap(), None);
    }

    #[test]
    fn unknown_contract_returns_none() {
        let (_dir, store) = store();
        set_active_thread(&store, "headcount", "root_abc").unwrap();
        assert_eq!(get_active_thread(&store, "other", 7).unwrap(), None);
    }

    #[test]
    fn expired_entry_returns_none() {
        let (_dir, store) = store();
        let old = Utc::now() - Duration::days(8);
        let mut file = ActiveThreadsFile::default();
        file.threads.insert(
            "headcount".to_string(),
            ActiveThreadEntry { root_post_id: "root_old".to_string(), updated_at: old.to_rfc3339() },
        );
        store.write_json_value(ACTIVE_THREADS_PATH, &serde_json::to_value(&file).unwrap()).unwrap();
        assert_eq!(get_active_thread(&store, "headcount", 7).unwrap(), None);
    }

    #[test]
    fn fresh_entry_within_ttl_returns_value() {
        let (_dir, store) = store();
        let fresh = Utc::now() - Duration::days(3);
        let mut file = ActiveThreadsFile::default();
        file.threads.insert(
            "headcount".to_string(),
            ActiveThreadEntry { root_post_id: "root_fresh".to_string(), updated_at: fresh.to_rfc3339() },
        );
        store.write_json_value(ACTIVE_THREADS_PATH, &serde_json::to_value(&file).unwrap()).unwrap();
        assert_eq!(get_active_thread(&store, "headcount", 7).unwrap(), Some("root_fresh".to_string()));
    }

    #[test]
    fn set_overwrites_previous_entry() {
        let (_dir, store) = store();
        set_active_thread(&store, "headcount", "root_v1").unwrap();
        set_active_thread(&store, "headcount", "root_v2").unwrap();
        assert_eq!(get_active_thread(&store, "headcount", 7).unwrap(), Some("root_v2".to_string()));
    }

    #[test]
    fn corrupt_json_is_treated_as_absent() {
        let (_dir, store) = store();
        store.write_file(ACTIVE_THREADS_PATH, "not json").unwrap();
        assert_eq!(get_active_thread(&store, "headcount", 7).unwrap(), None);
    }

    #[test]
    fn gc_removes_only_expired_entries() {
        let (_dir, store) = store();
        let fresh = Utc::now() - Duration::days(1);
        let old = Utc::now() - Duration::days(30);
        let mut file = ActiveThreadsFile::default();
        file.threads.insert(
            "fresh".to_string(),
            ActiveThreadEntry { root_post_id: "r1".to_string(), updated_at: fresh.to_rfc3339() },
        );
        file.threads.insert(
            "stale".to_string(),
            ActiveThreadEntry { root_post_id: "r2".to_string(), updated_at: old.to_rfc3339() },
        );
        store.write_json_value(ACTIVE_THREADS_PATH, &serde_json::to_value(&file).unwrap()).unwrap();

        let removed = gc_expired(&store, 7).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(get_active_thread(&store, "fresh", 7).unwrap(), Some("r1".to_string()));
        assert_eq!(get_active_thread(&store, "stale", 7).unwrap(), None);
    }

    #[test]
    fn gc_on_missing_file_is_a_noop() {
        let (_dir, store) = store();
        assert_eq!(gc_expired(&store, 7).unwrap(), 0);
    }
}
