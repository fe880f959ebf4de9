use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use covenant_chat::ChatClient;
use covenant_governance::{
    check_ambiguity, check_approval_policy, ensure_path_in_tree, mark_contract_agreed, validate_contract,
    ApprovalPolicy, Severity,
};
use covenant_llm::{LlmProvider, Tool, ToolResult};
use covenant_store::Store;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::relationships::{build_relationships_prompt, detect_mentions, parse_relationships_llm, upsert_relationships};

fn arg_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn extract_contract_name(md: &str) -> Option<String> {
    covenant_governance::markdown::extract_name(md)
}

pub struct SaveDraftTool {
    store: Arc<dyn Store>,
}

impl SaveDraftTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveDraftTool {
    fn name(&self) -> &str {
        "save_draft"
    }
    fn description(&self) -> &str {
        "Saves or updates a contract's draft content and its index entry."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}, "content": {"type": "string"}}, "required": ["contract_id", "content"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let (Some(id), Some(content)) = (arg_str(&input, "contract_id"), arg_str(&input, "content")) else {
            return ToolResult::error("contract_id and content are required");
        };
        if let Err(e) = self.store.save_draft(id, content) {
            return ToolResult::error(e.to_string());
        }
        let name = extract_contract_name(content).unwrap_or_else(|| id.to_string());
        let mut patch = serde_json::Map::new();
        patch.insert("name".to_string(), json!(name));
        patch.insert("status".to_string(), json!("draft"));
        patch.insert("file".to_string(), json!(format!("drafts/{id}.md")));
        if let Err(e) = self.store.update_contract_index(id, patch) {
            return ToolResult::error(e.to_string());
        }
        info!(contract_id = id, "saved draft");
        ToolResult::success(json!({"success": true, "contract_id": id, "name": name}).to_string())
    }
}

fn tier_policy_for(store: &dyn Store, contract_id: &str) -> Option<(String, ApprovalPolicy)> {
    let gov = store.read_json_value("context/governance.json").ok().flatten()?;
    let contracts = store.list_contracts().unwrap_or_default();
    let tier_key = contracts
        .iter()
        .find(|c| c.id.eq_ignore_ascii_case(contract_id))
        .and_then(|c| c.tier.clone())
        .unwrap_or_else(|| "tier_2".to_string());

    let cfg = gov.get("tiers")?.get(&tier_key)?;
    let policy = ApprovalPolicy {
        tier: tier_key.clone(),
        approval_required: cfg
            .get("approval_required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        consensus_threshold: cfg.get("consensus_threshold").and_then(Value::as_f64).unwrap_or(1.0),
    };
    Some((tier_key, policy))
}

pub struct SaveContractTool {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmProvider>,
    heavy_model: String,
}

impl SaveContractTool {
    pub fn new(store: Arc<dyn Store>, llm: Arc<dyn LlmProvider>, heavy_model: impl Into<String>) -> Self {
        Self { store, llm, heavy_model: heavy_model.into() }
    }

    /// Best-effort relationship refresh: deterministic mentions always run;
    /// the LLM semantic pass is skipped silently on any failure.
    async fn update_relationships(&self, contract_id: &str, content: &str) {
        let known_contracts = self.store.list_contracts().unwrap_or_default();
        let known_ids: Vec<String> = known_contracts.iter().map(|c| c.id.clone()).collect();
        let mut rels = detect_mentions(contract_id, content, &known_ids);

        let known_tuples: Vec<(String, String, String)> = known_contracts
            .iter()
            .map(|c| {
                let name = c.extra.get("name").and_then(Value::as_str).unwrap_or(&c.id).to_string();
                (c.id.clone(), name, c.status.clone().unwrap_or_default())
            })
            .collect();
        let (system, user) = build_relationships_prompt(contract_id, content, &known_tuples);
        let mut req = covenant_llm::ChatRequest::new(self.heavy_model.clone(), system, 1024);
        req.messages.push(covenant_llm::Message { role: covenant_llm::Role::User, content: user });
        match self.llm.send(&req).await {
            Ok(resp) => {
                let known_set: std::collections::HashSet<String> = known_ids.into_iter().collect();
                let proposed = parse_relationships_llm(&resp.content, contract_id, &known_set);
                rels.extend(proposed.into_iter().map(|p| crate::relationships::Relationship {
                    from: p.from,
                    to: p.to,
                    kind: p.kind,
                    description: p.description,
                }));
            }
            Err(e) => info!(error = %e, "relationships LLM pass skipped"),
        }

        if rels.is_empty() {
            return;
        }
        let idx = self.store.read_json_value("contracts/relationships.json").ok().flatten().unwrap_or_default();
        let (updated, added) = upsert_relationships(idx, &rels);
        if added > 0 {
            if let Err(e) = self.store.write_json_value("contracts/relationships.json", &updated) {
                warn!(error = %e, "failed to persist relationships");
            } else {
                info!(contract_id, added, "relationships updated");
            }
        }
    }

    fn mark_tree_agreed(&self, contract_id: &str, name: &str) {
        let Ok(Some(tree_text)) = self.store.read_file("context/metrics_tree.md") else { return };
        let mut patch = mark_contract_agreed(&tree_text, name);
        if !patch.ok {
            patch = mark_contract_agreed(&tree_text, contract_id);
        }
        if !patch.ok {
            // Brand-new metric: nothing in the tree references it yet, so
            // growing and agreeing are two separate patches over the tree.
            let leaf = format!("{name} ← DATA CONTRACT");
            let grown = ensure_path_in_tree(&tree_text, &[&leaf]);
            if grown.ok {
                patch = mark_contract_agreed(&grown.new_text, name);
                if !patch.ok {
                    patch = mark_contract_agreed(&grown.new_text, contract_id);
                }
            }
        }
        if patch.ok && patch.changed {
            let _ = self.store.write_file("context/metrics_tree.md", &patch.new_text);
        }
    }
}

#[async_trait]
impl Tool for SaveContractTool {
    fn name(&self) -> &str {
        "save_contract"
    }
    fn description(&self) -> &str {
        "Validates, checks governance and glossary, then commits a contract as agreed. \
         `force` downgrades glossary issues to warnings only."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "contract_id": {"type": "string"},
                "content": {"type": "string"},
                "force": {"type": "boolean"}
            },
            "required": ["contract_id", "content"]
        })
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let (Some(contract_id), Some(content)) = (arg_str(&input, "contract_id"), arg_str(&input, "content")) else {
            return ToolResult::error("contract_id and content are required");
        };
        let force = input.get("force").and_then(Value::as_bool).unwrap_or(false);

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let report = validate_contract(content);
        if !report.ok {
            for i in &report.issues {
                let entry = format!("Валидация: {}", i.message);
                match i.severity {
                    Severity::Warning => warnings.push(entry),
                    Severity::Error => errors.push(entry),
                }
            }
        }

        if let Some((tier_key, policy)) = tier_policy_for(self.store.as_ref(), contract_id) {
            let roles = covenant_participants::merge_role_map(self.store.as_ref()).unwrap_or_default();
            let role_map = roles.to_username_role_map();
            let check = check_approval_policy(content, &policy, &role_map);
            if !check.ok {
                let missing = if check.missing_roles.is_empty() {
                    "(неизвестно)".to_string()
                } else {
                    check.missing_roles.join(", ")
                };
                errors.push(format!("Governance ({tier_key}): не хватает ролей: {missing}"));
            }
        }

        let glossary = self
            .store
            .read_json_value("context/glossary.json")
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_value(v).ok());
        for gi in check_ambiguity(content, glossary.as_ref()) {
            let entry = format!("Глоссарий: {}", gi.message);
            if force {
                warnings.push(entry);
            } else {
                errors.push(entry);
            }
        }

        if !errors.is_empty() {
            return ToolResult::success(
                json!({"success": false, "contract_id": contract_id, "errors": errors, "warnings": warnings}).to_string(),
            );
        }

        if let Err(e) = self.store.save_contract(contract_id, content) {
            return ToolResult::error(e.to_string());
        }

        let name = extract_contract_name(content).unwrap_or_else(|| contract_id.to_string());
        let now_date = Utc::now().format("%Y-%m-%d").to_string();
        let mut patch = serde_json::Map::new();
        patch.insert("name".to_string(), json!(name));
        patch.insert("status".to_string(), json!("agreed"));
        patch.insert("file".to_string(), json!(format!("contracts/{contract_id}.md")));
        patch.insert("agreed_date".to_string(), json!(now_date.clone()));
        patch.insert("status_updated_at".to_string(), json!(now_date));
        if let Err(e) = self.store.update_contract_index(contract_id, patch) {
            return ToolResult::error(e.to_string());
        }

        self.update_relationships(contract_id, content).await;
        self.mark_tree_agreed(contract_id, &name);

        info!(contract_id, "saved contract");
        ToolResult::success(json!({"success": true, "contract_id": contract_id, "warnings": warnings}).to_string())
    }
}

pub struct UpdateDiscussionTool {
    store: Arc<dyn Store>,
}

impl UpdateDiscussionTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateDiscussionTool {
    fn name(&self) -> &str {
        "update_discussion"
    }
    fn description(&self) -> &str {
        "Replaces the discussion-state document for a contract (open questions, proposed resolution)."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}, "discussion": {"type": "object"}}, "required": ["contract_id", "discussion"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(id) = arg_str(&input, "contract_id") else {
            return ToolResult::error("contract_id is required");
        };
        let Some(discussion) = input.get("discussion").filter(|v| v.is_object()) else {
            return ToolResult::error("discussion must be a JSON object");
        };
        match self.store.update_discussion(id, discussion) {
            Ok(()) => ToolResult::success(json!({"success": true, "contract_id": id}).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct AddReminderTool {
    store: Arc<dyn Store>,
}

impl AddReminderTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddReminderTool {
    fn name(&self) -> &str {
        "add_reminder"
    }
    fn description(&self) -> &str {
        "Appends a reminder to the dunning-ladder queue."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"reminder": {"type": "object"}}, "required": ["reminder"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(reminder_value) = input.get("reminder").filter(|v| v.is_object()) else {
            return ToolResult::error("reminder must be a JSON object");
        };
        let reminder: covenant_store::types::Reminder = match serde_json::from_value(reminder_value.clone()) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("invalid reminder: {e}")),
        };
        let mut reminders = match self.store.get_reminders() {
            Ok(r) => r,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        reminders.push(reminder);
        match self.store.save_reminders(&reminders) {
            Ok(()) => ToolResult::success(json!({"success": true}).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct UpdateParticipantTool {
    store: Arc<dyn Store>,
}

impl UpdateParticipantTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateParticipantTool {
    fn name(&self) -> &str {
        "update_participant"
    }
    fn description(&self) -> &str {
        "Overwrites a participant's profile markdown."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"username": {"type": "string"}, "content": {"type": "string"}}, "required": ["username", "content"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let (Some(username), Some(content)) = (arg_str(&input, "username"), arg_str(&input, "content")) else {
            return ToolResult::error("username and content are required");
        };
        match self.store.update_participant(username, content) {
            Ok(()) => ToolResult::success(json!({"success": true, "username": username}).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct SaveDecisionTool {
    store: Arc<dyn Store>,
}

impl SaveDecisionTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveDecisionTool {
    fn name(&self) -> &str {
        "save_decision"
    }
    fn description(&self) -> &str {
        "Appends a decision record to the audit log."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"decision": {"type": "object"}}, "required": ["decision"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(decision) = input.get("decision").filter(|v| v.is_object()) else {
            return ToolResult::error("decision must be a JSON object");
        };
        match self.store.save_decision(decision.clone()) {
            Ok(()) => ToolResult::success(json!({"success": true}).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct AssignRoleTool {
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatClient>,
}

impl AssignRoleTool {
    pub fn new(store: Arc<dyn Store>, chat: Arc<dyn ChatClient>) -> Self {
        Self { store, chat }
    }
}

#[async_trait]
impl Tool for AssignRoleTool {
    fn name(&self) -> &str {
        "assign_role"
    }
    fn description(&self) -> &str {
        "Assigns a username to a role in the runtime role file."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"role": {"type": "string"}, "username": {"type": "string"}}, "required": ["role", "username"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let (Some(role), Some(username)) = (arg_str(&input, "role"), arg_str(&input, "username")) else {
            return ToolResult::error("role and username are required");
        };
        match covenant_participants::assign_role(self.store.as_ref(), self.chat.as_ref(), role, username).await {
            Ok(outcome) => {
                ToolResult::success(json!({"success": true, "role": outcome.role, "username": outcome.username}).to_string())
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct SetContractStatusTool {
    store: Arc<dyn Store>,
}

impl SetContractStatusTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetContractStatusTool {
    fn name(&self) -> &str {
        "set_contract_status"
    }
    fn description(&self) -> &str {
        "Sets a contract's lifecycle status directly."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}, "status": {"type": "string"}}, "required": ["contract_id", "status"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let (Some(id), Some(status)) = (arg_str(&input, "contract_id"), arg_str(&input, "status")) else {
            return ToolResult::error("contract_id and status are required");
        };
        match covenant_governance::set_status(self.store.as_ref(), id, status) {
            Ok(result) if result.ok => {
                ToolResult::success(json!({"success": true, "contract_id": id, "status": status, "message": result.message}).to_string())
            }
            Ok(result) => ToolResult::success(json!({"success": false, "error": result.message}).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct CreatePollTool {
    chat: Arc<dyn ChatClient>,
}

impl CreatePollTool {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Tool for CreatePollTool {
    fn name(&self) -> &str {
        "create_poll"
    }
    fn description(&self) -> &str {
        "Posts a lettered-options poll message to the configured channel."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"},
                "options": {"type": "array", "items": {"type": "string"}},
                "channel_id": {"type": "string"}
            },
            "required": ["question", "options"]
        })
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(question) = arg_str(&input, "question") else {
            return ToolResult::error("question is required");
        };
        let Some(options) = input.get("options").and_then(Value::as_array) else {
            return ToolResult::error("options must be a list with at least 2 items");
        };
        let options: Vec<&str> = options.iter().filter_map(Value::as_str).collect();
        if options.len() < 2 {
            return ToolResult::error("options must be a list with at least 2 items");
        }

        let letters = "ABCDEFGHIJ";
        let mut text = format!("**{question}**\n");
        for (i, option) in options.iter().enumerate() {
            let letter = letters.as_bytes()[i.min(letters.len() - 1)] as char;
            text.push_str(&format!("{letter}) {option}\n"));
        }

        match self.chat.send_to_channel(&text, None).await {
            Ok(_) => ToolResult::success(json!({"success": true}).to_string()),
            Err(e) => ToolResult::success(json!({"success": false, "error": e.to_string()}).to_string()),
        }
    }
}
