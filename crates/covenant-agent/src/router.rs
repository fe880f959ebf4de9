//! Intent classification: deterministic regex fast-paths first, a cheap-LLM
//! JSON classifier as the fallback for open-ended intents.

use std::collections::HashSet;

use covenant_core::{ChannelKind, ContractId, ModelTier};
use covenant_llm::{ChatRequest, LlmProvider};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

const NEW_CONTRACT_BOOTSTRAP_FILES: &[&str] = &[
    "context/metrics_tree.md",
    "context/glossary.json",
    "context/governance_policy.json",
];

/// The closed intent set the router is allowed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ContractHistory,
    ContractVersion,
    ContractDiff,
    ShowContract,
    ShowDraft,
    ConflictsAudit,
    RelationshipsShow,
    GovernanceReviewAudit,
    GovernancePolicyShow,
    GovernanceRequirementsFor,
    LifecycleGetStatus,
    LifecycleSetStatus,
    RolesAssign,
    ContractDiscussion,
    NewContractInit,
    ProblemReport,
    ProfileIntro,
    GeneralQuestion,
    StatusRequest,
    ContractRequest,
    Irrelevant,
}

impl Intent {
    fn from_classifier_str(s: &str) -> Self {
        match s {
            "contract_discussion" => Intent::ContractDiscussion,
            "new_contract_init" => Intent::NewContractInit,
            "problem_report" => Intent::ProblemReport,
            "profile_intro" => Intent::ProfileIntro,
            "status_request" => Intent::StatusRequest,
            "contract_request" => Intent::ContractRequest,
            "irrelevant" => Intent::Irrelevant,
            _ => Intent::GeneralQuestion,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub intent: Intent,
    pub entity: Option<String>,
    pub load_files: Vec<String>,
    pub model: ModelTier,
}

/// A `Data Lead — @user` style line for `roles_assign`.
#[derive(Debug, Clone)]
pub struct RoleAssignLine {
    pub role: String,
    pub mention: String,
}

/// Deterministic regex fast-paths. Evaluated before the LLM classifier;
/// whichever matches first wins. Returns `None` when nothing matches.
pub fn fast_path(message: &str) -> Option<RouteDecision> {
    let patterns: &[(Intent, &str)] = &[
        (Intent::ContractHistory, r"(?i)\bистори[яи]\s+контракт[а]?\s+([a-z0-9_]+)\b"),
        (
            Intent::ContractVersion,
            r"(?i)\bпокажи\s+верси[юи]\s+([a-z0-9_]+)\s+([0-9]{8}T[0-9]{6}\.[0-9]{6}Z(?:_prev)?)\b",
        ),
        (Intent::ContractDiff, r"(?i)\bсравни(?:ть)?\s+верси[иь]\s+([a-z0-9_]+)\b"),
        (Intent::ShowContract, r"(?i)\bпокажи\s+контракт\s+([a-z0-9_]+)\b"),
        (Intent::ShowDraft, r"(?i)\bпокажи\s+черновик\s+([a-z0-9_]+)\b"),
        (Intent::ConflictsAudit, r"(?i)\bконфликт(?:ы)?\s+контракт[а]?\s+([a-z0-9_]+)\b"),
        (Intent::RelationshipsShow, r"(?i)\bсвяз(?:и|ь)\s+контракт[а]?\s+([a-z0-9_]+)\b"),
        (Intent::GovernanceReviewAudit, r"(?i)\bчто\s+(?:нужно|требуется)\s+(?:проверить|отревьюить)\b"),
        (Intent::GovernancePolicyShow, r"(?i)\bполитика\s+управления\b"),
        (Intent::GovernanceRequirementsFor, r"(?i)\bтребования\s+для\s+([a-z0-9_]+)\b"),
        (Intent::LifecycleGetStatus, r"(?i)\bстатус\s+контракт[а]?\s+([a-z0-9_]+)\b"),
        (Intent::LifecycleSetStatus, r"(?i)\bустанови\s+статус\s+([a-z0-9_]+)\s+([a-z_]+)\b"),
    ];

    for (intent, pattern) in patterns {
        let Ok(re) = Regex::new(pattern) else { continue };
        if let Some(caps) = re.captures(message) {
            let entity = caps
                .iter()
                .skip(1)
                .filter_map(|c| c.map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
                .join(":");
            return Some(RouteDecision {
                intent: *intent,
                entity: if entity.is_empty() { None } else { Some(entity) },
                load_files: Vec::new(),
                model: ModelTier::Cheap,
            });
        }
    }

    None
}

/// Extracts `Role — @mention` lines from a message body.
pub fn extract_role_assign_lines(message: &str) -> Vec<RoleAssignLine> {
    let re = Regex::new(r"(?i)^\s*([\p{L} ]+?)\s*[—-]\s*@([a-zA-Z0-9._-]+)\s*$").unwrap();
    message
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            Some(RoleAssignLine {
                role: caps[1].trim().to_lowercase(),
                mention: caps[2].to_string(),
            })
        })
        .collect()
}

fn strip_code_fence(raw: &str) -> String {
    let raw = raw.trim();
    if !raw.starts_with("```") {
        return raw.to_string();
    }
    raw.lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Permissive JSON extraction: first `{` to last `}`, after fence stripping.
fn extract_json_object(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fence(raw);
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}

/// Classifies an inbound message using the cheap model, when no fast-path
/// matches. Falls back to `general_question`/heavy on any parse failure —
/// the router never errors out of a classification.
pub async fn classify(
    cheap: &dyn LlmProvider,
    router_system_prompt: &str,
    username: &str,
    message: &str,
    channel_kind: ChannelKind,
    thread_context: Option<&str>,
    model_name: &str,
) -> RouteDecision {
    let channel_label = match channel_kind {
        ChannelKind::Channel => "канале",
        ChannelKind::Dm => "личных сообщениях",
    };
    let mut user_input = format!("Сообщение от @{username} в {channel_label}:\n\"{message}\"\n");
    if let Some(ctx) = thread_context {
        user_input.push_str(&format!("\nКонтекст треда:\n{ctx}\n"));
    }

    let mut req = ChatRequest::new(model_name, router_system_prompt, 512);
    req.messages.push(covenant_llm::Message { role: covenant_llm::Role::User, content: user_input });

    let fallback = RouteDecision {
        intent: Intent::GeneralQuestion,
        entity: None,
        load_files: Vec::new(),
        model: ModelTier::Heavy,
    };

    let response = match cheap.send(&req).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "router classifier call failed");
            return fallback;
        }
    };

    let Some(data) = extract_json_object(&response.content) else {
        warn!(raw = %response.content, "router failed to parse classifier JSON");
        return fallback;
    };

    let intent_str = data.get("type").and_then(Value::as_str).unwrap_or("general_question");
    let intent = Intent::from_classifier_str(intent_str);
    let entity = data.get("entity").and_then(Value::as_str).map(str::to_string);
    let mut load_files: Vec<String> = data
        .get("load_files")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let cheap_types: HashSet<Intent> =
        [Intent::ContractRequest, Intent::StatusRequest, Intent::Irrelevant].into_iter().collect();
    let model = if cheap_types.contains(&intent) { ModelTier::Cheap } else { ModelTier::Heavy };

    let entity = if matches!(intent, Intent::NewContractInit) {
        load_files = NEW_CONTRACT_BOOTSTRAP_FILES.iter().map(|s| s.to_string()).collect();
        entity.map(|e| ContractId::slugify(&e, 60).as_str().to_string())
    } else {
        entity
    };

    RouteDecision { intent, entity, load_files, model }
}

/// Top-level entry point: try the fast-path table, then the classifier.
pub async fn route(
    cheap: &dyn LlmProvider,
    router_system_prompt: &str,
    username: &str,
    message: &str,
    channel_kind: ChannelKind,
    thread_context: Option<&str>,
    model_name: &str,
) -> RouteDecision {
    if let Some(decision) = fast_path(message) {
        return decision;
    }
    classify(cheap, router_system_prompt, username, message, channel_kind, thread_context, model_name).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_matches_history_command() {
        let decision = fast_path("покажи историю контракта mau").unwrap();
        assert_eq!(decision.intent, Intent::ContractHistory);
        assert_eq!(decision.entity, Some("mau".to_string()));
    }

    #[test]
    fn fast_path_returns_none_for_free_text() {
        assert!(fast_path("давайте обсудим новую метрику активации").is_none());
    }

    #[test]
    fn extracts_role_assign_lines() {
        let lines = extract_role_assign_lines("Data Lead — @alice\nCircle Lead — @bob\nигнор текст");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].role, "data lead");
        assert_eq!(lines[0].mention, "alice");
    }

    #[test]
    fn extract_json_object_strips_code_fence() {
        let raw = "```json\n{\"type\": \"general_question\"}\n```";
        let v = extract_json_object(raw).unwrap();
        assert_eq!(v["type"], "general_question");
    }
}
