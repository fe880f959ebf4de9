use std::sync::Arc;

use async_trait::async_trait;
use covenant_governance::{check_approval_policy, validate_contract, ApprovalPolicy, Severity};
use covenant_llm::{Tool, ToolResult};
use covenant_store::Store;
use serde_json::{json, Value};

fn arg_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn role_map_from_store(store: &dyn Store) -> std::collections::HashMap<String, String> {
    let merged = covenant_participants::merge_role_map(store).unwrap_or_default();
    merged.to_username_role_map()
}

pub struct ReadContractTool {
    store: Arc<dyn Store>,
}

impl ReadContractTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadContractTool {
    fn name(&self) -> &str {
        "read_contract"
    }
    fn description(&self) -> &str {
        "Reads the current agreed content of a contract by id."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}}, "required": ["contract_id"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(id) = arg_str(&input, "contract_id") else {
            return ToolResult::error("contract_id is required");
        };
        match self.store.get_contract(id) {
            Ok(Some(content)) => ToolResult::success(json!({"contract_id": id, "content": content}).to_string()),
            Ok(None) => ToolResult::error(format!("Контракт {id} не найден (contracts/{id}.md)")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct ReadDraftTool {
    store: Arc<dyn Store>,
}

impl ReadDraftTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadDraftTool {
    fn name(&self) -> &str {
        "read_draft"
    }
    fn description(&self) -> &str {
        "Reads the in-progress draft content of a contract by id."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}}, "required": ["contract_id"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(id) = arg_str(&input, "contract_id") else {
            return ToolResult::error("contract_id is required");
        };
        match self.store.get_draft(id) {
            Ok(Some(content)) => ToolResult::success(json!({"contract_id": id, "content": content}).to_string()),
            Ok(None) => ToolResult::error(format!("Черновик {id} не найден (drafts/{id}.md)")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct ReadDiscussionTool {
    store: Arc<dyn Store>,
}

impl ReadDiscussionTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadDiscussionTool {
    fn name(&self) -> &str {
        "read_discussion"
    }
    fn description(&self) -> &str {
        "Reads the discussion state (open questions, proposed resolution) for a contract."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}}, "required": ["contract_id"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(id) = arg_str(&input, "contract_id") else {
            return ToolResult::error("contract_id is required");
        };
        match self.store.get_discussion(id) {
            Ok(Some(discussion)) => ToolResult::success(json!({"contract_id": id, "discussion": discussion}).to_string()),
            Ok(None) => ToolResult::error(format!("Обсуждение {id} не найдено")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct ReadGovernancePolicyTool {
    store: Arc<dyn Store>,
}

impl ReadGovernancePolicyTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadGovernancePolicyTool {
    fn name(&self) -> &str {
        "read_governance_policy"
    }
    fn description(&self) -> &str {
        "Reads the approval policy (required roles, consensus threshold) for a governance tier."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"tier": {"type": "string"}}, "required": ["tier"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(tier) = arg_str(&input, "tier") else {
            return ToolResult::error("tier is required");
        };
        let gov = match self.store.read_json_value("context/governance.json") {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let Some(cfg) = gov.get("tiers").and_then(|t| t.get(tier)) else {
            return ToolResult::error(format!("Политика {tier} не найдена"));
        };

        let required: Vec<String> = cfg
            .get("approval_required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let role_map = role_map_from_store(self.store.as_ref());
        let merged = covenant_participants::merge_role_map(self.store.as_ref()).unwrap_or_default();
        let _ = &role_map;
        let assignments: serde_json::Map<String, Value> = required
            .iter()
            .map(|r| (r.clone(), json!(merged.users_for_role(r))))
            .collect();

        ToolResult::success(
            json!({
                "tier": tier,
                "description": cfg.get("description").cloned().unwrap_or(Value::Null),
                "approval_required": required,
                "consensus_threshold": cfg.get("consensus_threshold").cloned().unwrap_or(Value::Null),
                "current_assignments": assignments,
            })
            .to_string(),
        )
    }
}

pub struct ReadRolesTool {
    store: Arc<dyn Store>,
}

impl ReadRolesTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadRolesTool {
    fn name(&self) -> &str {
        "read_roles"
    }
    fn description(&self) -> &str {
        "Reads the merged role map (defaults union runtime assignments)."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> ToolResult {
        match covenant_participants::merge_role_map(self.store.as_ref()) {
            Ok(roles) => ToolResult::success(json!({"roles": roles.0}).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct ValidateContractTool;

impl ValidateContractTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ValidateContractTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ValidateContractTool {
    fn name(&self) -> &str {
        "validate_contract"
    }
    fn description(&self) -> &str {
        "Runs the structural validator over a candidate contract markdown body."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_md": {"type": "string"}}, "required": ["contract_md"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(md) = arg_str(&input, "contract_md") else {
            return ToolResult::error("contract_md is required");
        };
        let report = validate_contract(md);
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        for i in &report.issues {
            let entry = json!({"code": i.code, "message": i.message});
            if matches!(i.severity, Severity::Warning) {
                warnings.push(entry);
            } else {
                issues.push(entry);
            }
        }

        ToolResult::success(json!({"ok": report.ok, "issues": issues, "warnings": warnings}).to_string())
    }
}

pub struct CheckApprovalTool {
    store: Arc<dyn Store>,
}

impl CheckApprovalTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
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

#[async_trait]
impl Tool for CheckApprovalTool {
    fn name(&self) -> &str {
        "check_approval"
    }
    fn description(&self) -> &str {
        "Checks whether a contract body satisfies its tier's approval policy and glossary rules."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}, "contract_md": {"type": "string"}}, "required": ["contract_id", "contract_md"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let (Some(id), Some(md)) = (arg_str(&input, "contract_id"), arg_str(&input, "contract_md")) else {
            return ToolResult::error("contract_id and contract_md are required");
        };

        let Some((tier, policy)) = tier_policy_for(self.store.as_ref(), id) else {
            return ToolResult::success(
                json!({"ok": true, "missing_roles": [], "glossary_issues": [], "note": "tier не найден, пропускаю governance"}).to_string(),
            );
        };

        let role_map = role_map_from_store(self.store.as_ref());
        let check = check_approval_policy(md, &policy, &role_map);

        let glossary = self
            .store
            .read_json_value("context/glossary.json")
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_value(v).ok());
        let glossary_issues: Vec<Value> = covenant_governance::check_ambiguity(md, glossary.as_ref())
            .iter()
            .map(|g| json!({"canonical": g.canonical, "message": g.message}))
            .collect();

        ToolResult::success(
            json!({
                "ok": check.ok && glossary_issues.is_empty(),
                "tier": tier,
                "missing_roles": check.missing_roles,
                "glossary_issues": glossary_issues,
            })
            .to_string(),
        )
    }
}

pub struct DiffContractTool {
    store: Arc<dyn Store>,
}

impl DiffContractTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DiffContractTool {
    fn name(&self) -> &str {
        "diff_contract"
    }
    fn description(&self) -> &str {
        "Compares the two most recent snapshots of a contract's version history."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"contract_id": {"type": "string"}}, "required": ["contract_id"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(id) = arg_str(&input, "contract_id") else {
            return ToolResult::error("contract_id is required");
        };
        let history = match self.store.get_contract_history(id) {
            Ok(h) => h,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        if history.len() < 2 {
            return ToolResult::success(json!({"contract_id": id, "has_diff": false}).to_string());
        }
        let prev_ts = &history[history.len() - 2].ts;
        let curr_ts = &history[history.len() - 1].ts;
        let prev = self.store.get_contract_version(id, prev_ts).ok().flatten().unwrap_or_default();
        let curr = self.store.get_contract_version(id, curr_ts).ok().flatten().unwrap_or_default();
        let p_lines: Vec<&str> = prev.lines().collect();
        let c_lines: Vec<&str> = curr.lines().collect();
        let added: Vec<&str> = c_lines.iter().filter(|l| !p_lines.contains(l)).copied().collect();
        let removed: Vec<&str> = p_lines.iter().filter(|l| !c_lines.contains(l)).copied().collect();

        ToolResult::success(
            json!({
                "contract_id": id,
                "has_diff": true,
                "from": prev_ts,
                "to": curr_ts,
                "added_lines": added,
                "removed_lines": removed,
            })
            .to_string(),
        )
    }
}

pub struct ListContractsTool {
    store: Arc<dyn Store>,
}

impl ListContractsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListContractsTool {
    fn name(&self) -> &str {
        "list_contracts"
    }
    fn description(&self) -> &str {
        "Lists every indexed contract with its id, name, status, and tier."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> ToolResult {
        match self.store.list_contracts() {
            Ok(contracts) => {
                let items: Vec<Value> = contracts
                    .iter()
                    .map(|c| json!({"id": c.id, "name": c.extra.get("name"), "status": c.status, "tier": c.tier}))
                    .collect();
                ToolResult::success(json!({"contracts": items}).to_string())
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct GenerateContractTemplateTool;

impl GenerateContractTemplateTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GenerateContractTemplateTool {
    fn default() -> Self {
        Self::new()
    }
}

const TEMPLATE_SECTIONS: &[&str] = &[
    "Статус",
    "Определение",
    "Формула",
    "Источник данных",
    "Включает",
    "Исключения",
    "Гранулярность",
    "Ответственный за данные",
    "Ответственный за расчёт",
    "Связь с Extra Time",
    "Потребители",
    "Состояние данных",
    "Согласовано",
    "История изменений",
];

#[async_trait]
impl Tool for GenerateContractTemplateTool {
    fn name(&self) -> &str {
        "generate_contract_template"
    }
    fn description(&self) -> &str {
        "Produces a blank contract markdown skeleton with every required section heading."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]})
    }
    async fn execute(&self, input: Value) -> ToolResult {
        let Some(name) = arg_str(&input, "name") else {
            return ToolResult::error("name is required");
        };
        let mut md = format!("# Data Contract: {name}\n\n");
        for section in TEMPLATE_SECTIONS {
            md.push_str(&format!("## {section}\n\n_TODO_\n\n"));
        }
        ToolResult::success(json!({"content": md}).to_string())
    }
}

pub struct ParticipantStatsTool {
    store: Arc<dyn Store>,
}

impl ParticipantStatsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ParticipantStatsTool {
    fn name(&self) -> &str {
        "participant_stats"
    }
    fn description(&self) -> &str {
        "Reports active/onboarded participant counts and per-role headcounts."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> ToolResult {
        let usernames = match self.store.list_participants(false) {
            Ok(u) => u,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let active = match self.store.list_participants(true) {
            Ok(u) => u.len(),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let roles = covenant_participants::merge_role_map(self.store.as_ref()).unwrap_or_default();
        let per_role: serde_json::Map<String, Value> =
            roles.0.iter().map(|(role, users)| (role.clone(), json!(users.len()))).collect();

        ToolResult::success(
            json!({
                "total_participants": usernames.len(),
                "active_participants": active,
                "per_role_counts": per_role,
            })
            .to_string(),
        )
    }
}
