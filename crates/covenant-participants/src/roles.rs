//! The merged role map (`context/roles.json` defaults ∪ `tasks/roles.json`
//! runtime state) and the `roles_assign` tool's persistence logic.

use covenant_chat::ChatClient;
use covenant_store::Store;
use tracing::info;

use crate::error::Result;
use crate::types::{RoleMap, RolesFile};

const DEFAULT_ROLES_PATH: &str = "context/roles.json";
const RUNTIME_ROLES_PATH: &str = "tasks/roles.json";

/// Unions the two role files, case-insensitively de-duplicating usernames
/// within each role. Defaults are never mutated; only `tasks/roles.json` is
/// ever written back to.
pub fn merge_role_map(store: &dyn Store) -> Result<RoleMap> {
    let mut merged: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();

    for path in [DEFAULT_ROLES_PATH, RUNTIME_ROLES_PATH] {
        let Some(value) = store.read_json_value(path)? else { continue };
        let Ok(file) = serde_json::from_value::<RolesFile>(value) else { continue };
        for (role, users) in file.roles {
            let entry = merged.entry(role).or_default();
            let mut seen_lower: std::collections::HashSet<String> =
                entry.iter().map(|u| u.to_lowercase()).collect();
            for u in users {
                let lower = u.to_lowercase();
                if seen_lower.insert(lower.clone()) {
                    entry.push(lower);
                }
            }
        }
    }

    Ok(RoleMap(merged))
}

#[derive(Debug, Clone)]
pub struct AssignRoleOutcome {
    pub role: String,
    pub username: String,
}

/// Resolves `username` via the chat client when it looks like a display
/// name rather than a raw handle, then appends it to `tasks/roles.json`
/// under `role`. Only the runtime file is ever touched.
pub async fn assign_role(
    store: &dyn Store,
    chat: &dyn ChatClient,
    role: &str,
    username: &str,
) -> Result<AssignRoleOutcome> {
    let role = role.trim().to_lowercase();
    let mut username = username.trim().trim_start_matches('@').to_lowercase();

    if role.is_empty() || username.is_empty() {
        return Err(crate::error::ParticipantError::MissingRoleOrUsername);
    }

    if let Ok(Some(resolved)) = chat.resolve_username(&username).await {
        username = resolved.to_lowercase();
    }

    let mut file: RolesFile = store
        .read_json_value(RUNTIME_ROLES_PATH)?
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let users = file.roles.entry(role.clone()).or_default();
    if !users.iter().any(|u| u.eq_ignore_ascii_case(&username)) {
        users.push(username.clone());
    }

    store.write_json_value(RUNTIME_ROLES_PATH, &serde_json::to_value(&file)?)?;
    info!(role = %role, username = %username, "assigned role");

    Ok(AssignRoleOutcome { role, username })
}

#[cfg(test)]
mod tests {
    use covenant_chat::console::ConsoleChatClient;
    use covenant_store::FileTreeStore;

    use super::*;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        (dir, store)
    }

    #[tokio::test]
    async fn assign_role_writes_only_the_runtime_file() {
        let (_dir, store) = store();
        let chat = ConsoleChatClient::new("bot", "general");

        let outcome = assign_role(&store, &chat, "Data Lead", "@Alice").await.unwrap();
        assert_eq!(outcome.role, "data lead");
        assert_eq!(outcome.username, "alice");

        let merged = merge_role_map(&store).unwrap();
        assert_eq!(merged.users_for_role("data lead"), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn assign_role_is_idempotent_for_the_same_user() {
        let (_dir, store) = store();
        let chat = ConsoleChatClient::new("bot", "general");

        assign_role(&store, &chat, "circle_lead", "bob").await.unwrap();
        assign_role(&store, &chat, "circle_lead", "bob").await.unwrap();

        let merged = merge_role_map(&store).unwrap();
        assert_eq!(merged.users_for_role("circle_lead"), vec!["bob".to_string()]);
    }

    #[test]
    fn merge_unions_defaults_and_runtime_case_insensitively() {
        let (_dir, store) = store();
        store
            .write_json_value(
                "context/roles.json",
                &serde_json::json!({"roles": {"ceo": ["Carol"]}}),
            )
            .unwrap();
        store
            .write_json_value(
                "tasks/roles.json",
                &serde_json::json!({"roles": {"ceo": ["carol"], "cfo": ["dave"]}}),
            )
            .unwrap();

        let merged = merge_role_map(&store).unwrap();
        assert_eq!(merged.users_for_role("ceo"), vec!["carol".to_string()]);
        assert_eq!(merged.users_for_role("cfo"), vec!["dave".to_string()]);
    }
}
