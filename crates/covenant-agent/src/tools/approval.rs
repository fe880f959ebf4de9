//! `request_approval` / `approve_contract`: the consensus-vote tools that
//! sit on top of the tier policy `check_approval` only reads.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use covenant_chat::ChatClient;
use covenant_llm::{Tool, ToolResult};
use covenant_store::Store;
use serde_json::{json, Value};
use tracing::{info, warn};

fn arg_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn tier_for(store: &dyn Store, contract_id: &str) -> String {
    store
        .list_contracts()
        .unwrap_or_default()
        .iter()
        .find(|c| c.id.eq_ignore_ascii_case(contract_id))
        .and_then(|c| c.tier.clone())
        .unwrap_or_else(|| "tier_2".to_string())
}

fn required_roles_for_tier(store: &dyn Store, tier: &str) -> Vec<String> {
    let Ok(Some(gov)) = store.read_json_value("context/governance.json") else { return Vec::new() };
    gov.get("tiers")
        .and_then(|t| t.get(tier))
        .and_then(|cfg| cfg.get("approval_required"))
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

pub struct RequestApprovalTool {
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatClient>,
}

impl RequestApprovalTool {
    pub fn new(store: Arc<dyn Store>, chat: Arc<dyn ChatClient>) -> Self {
        Self { store, chat }
    }
}

#[async_trait]
impl Tool for RequestApprovalTool {
    fn name(&self) -> &str {
        "request_approval"
    }
    fn description(&self) -> &str {
        "Opens (or re-seeds) an approval vote for a contract and DMs every required role holder."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}}, "required": ["contract_id"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(contract_id) = arg_str(&input, "contract_id") else {
            return ToolResult::error("contract_id is required");
        };

        let tier = tier_for(self.store.as_ref(), contract_id);
        let required_roles = required_roles_for_tier(self.store.as_ref(), &tier);

        let contracts = match self.store.list_contracts() {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let prior_approvals: serde_json::Map<String, Value> = contracts
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(contract_id))
            .and_then(|c| c.extra.get("approval_state"))
            .and_then(|s| s.get("approvals"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let approval_state = json!({
            "tier": tier,
            "required_roles": required_roles,
            "approvals": prior_approvals,
        });

        let mut patch = serde_json::Map::new();
        patch.insert("approval_state".to_string(), approval_state.clone());
        if let Err(e) = self.store.update_contract_index(contract_id, patch) {
            return ToolResult::error(e.to_string());
        }

        let roles = covenant_participants::merge_role_map(self.store.as_ref()).unwrap_or_default();
        let mut notified = Vec::new();
        for role in &required_roles {
            for username in roles.users_for_role(role) {
                let message =
                    format!("Требуется согласование контракта `{contract_id}` (tier {tier}, роль {role}).");
                match self.chat.send_dm(&username, &message, None).await {
                    Ok(_) => notified.push(username),
                    Err(e) => warn!(username, error = %e, "failed to notify approver"),
                }
            }
        }

        info!(contract_id, tier, notified = notified.len(), "requested approval");
        ToolResult::success(
            json!({"success": true, "contract_id": contract_id, "tier": tier, "notified": notified}).to_string(),
        )
    }
}

pub struct ApproveContractTool {
    store: Arc<dyn Store>,
}

impl ApproveContractTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ApproveContractTool {
    fn name(&self) -> &str {
        "approve_contract"
    }
    fn description(&self) -> &str {
        "Records the caller's approval vote if their role is required and they haven't voted yet."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}, "username": {"type": "string"}}, "required": ["contract_id", "username"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let (Some(contract_id), Some(username)) = (arg_str(&input, "contract_id"), arg_str(&input, "username")) else {
            return ToolResult::error("contract_id and username are required");
        };
        let username = username.trim().trim_start_matches('@').to_lowercase();

        let contracts = match self.store.list_contracts() {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let Some(state) = contracts
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(contract_id))
            .and_then(|c| c.extra.get("approval_state"))
            .cloned()
        else {
            return ToolResult::success(
                json!({"success": false, "error": "approval is not open for this contract"}).to_string(),
            );
        };

        let required_roles: Vec<String> = state
            .get("required_roles")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let roles = covenant_participants::merge_role_map(self.store.as_ref()).unwrap_or_default();
        let username_role = roles.to_username_role_map().get(&username).cloned();
        let Some(role) = username_role.filter(|r| required_roles.contains(r)) else {
            return ToolResult::success(
                json!({"success": false, "error": "caller's role is not required for this approval"}).to_string(),
            );
        };

        let mut approvals = state.get("approvals").and_then(Value::as_object).cloned().unwrap_or_default();
        if approvals.contains_key(&username) {
            return ToolResult::success(
                json!({"success": true, "already_approved": true, "contract_id": contract_id}).to_string(),
            );
        }
        approvals.insert(username.clone(), json!(Utc::now().to_rfc3339()));

        let mut new_state = state.clone();
        new_state["approvals"] = Value::Object(approvals);

        let mut patch = serde_json::Map::new();
        patch.insert("approval_state".to_string(), new_state);
        if let Err(e) = self.store.update_contract_index(contract_id, patch) {
            return ToolResult::error(e.to_string());
        }

        info!(contract_id, username, role, "recorded approval vote");
        ToolResult::success(
            json!({"success": true, "already_approved": false, "contract_id": contract_id, "role": role}).to_string(),
        )
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

    #[tokio::test]
    async fn approve_without_open_request_fails() {
        let (_dir, store) = store();
        let tool = ApproveContractTool::new(Arc::new(store));
        let result = tool.execute(json!({"contract_id": "mau", "username": "alice"})).await;
        assert!(!result.is_error);
        assert!(result.content.contains("\"success\":false"));
    }
}
