//! Dispatches the fixed set of planner action verbs as chat sends, each
//! returning metadata the engine folds back into the initiative.

use chrono::Utc;
use covenant_chat::ChatClient;
use covenant_core::Config;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::state::Initiative;

#[derive(Debug, Clone, Deserialize)]
pub struct PlannedAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub contract_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message_hint: String,
    #[serde(default)]
    pub target_user: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub action: String,
    pub at: String,
    pub post_id: String,
    pub contract_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_to: Option<String>,
}

fn strip_mention(user: &str) -> &str {
    user.strip_prefix('@').unwrap_or(user)
}

pub struct ActionDispatcher<'a> {
    chat: &'a dyn ChatClient,
    escalation_user: &'a str,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(chat: &'a dyn ChatClient, config: &'a Config) -> Self {
        Self { chat, escalation_user: &config.escalation_user }
    }

    pub async fn execute(&self, action: &PlannedAction, initiative: &Initiative) -> Option<ActionResult> {
        let result = match action.kind.as_str() {
            "start_thread" => self.start_thread(action, initiative).await,
            "ask_question" => self.ask_question(action, initiative).await,
            "propose_resolution" => self.propose_resolution(action, initiative).await,
            "partial_fix" => self.partial_fix(action, initiative).await,
            "follow_up" => self.follow_up(action, initiative).await,
            "escalate" => self.escalate(action, initiative).await,
            other => {
                warn!(action = other, "unknown planner action type");
                return None;
            }
        };
        match result {
            Ok(r) => Some(r),
            Err(e) => {
                error!(action = %action.kind, error = %e, "failed to execute planner action");
                None
            }
        }
    }

    async fn start_thread(&self, action: &PlannedAction, initiative: &Initiative) -> covenant_chat::error::Result<ActionResult> {
        let mentions = initiative.stakeholders.iter().map(|s| format!("@{s}")).collect::<Vec<_>>().join(" ");
        let hint = if action.message_hint.is_empty() {
            format!("Обсуждение контракта {}", action.contract_id)
        } else {
            action.message_hint.clone()
        };
        let mut message = format!(":dart: **{hint}**\n\nКонтракт: `{}`\nПричина: {}\n", action.contract_id, action.reason);
        if !mentions.is_empty() {
            message.push_str(&format!("\n{mentions} — прошу вашего участия в обсуждении."));
        }

        let post_id = self.chat.send_to_channel(&message, None).await?;
        Ok(ActionResult { action: "start_thread".into(), at: Utc::now().to_rfc3339(), post_id, contract_id: action.contract_id.clone(), target: None, escalated_to: None })
    }

    async fn ask_question(&self, action: &PlannedAction, initiative: &Initiative) -> covenant_chat::error::Result<ActionResult> {
        let target = action.target_user.as_deref().map(strip_mention).unwrap_or_default();
        let message = if target.is_empty() { action.message_hint.clone() } else { format!("@{target}, {}", action.message_hint) };

        let post_id = self.chat.send_to_channel(&message, initiative.thread_id.as_deref()).await?;
        Ok(ActionResult {
            action: "ask_question".into(),
            at: Utc::now().to_rfc3339(),
            post_id,
            contract_id: action.contract_id.clone(),
            target: if target.is_empty() { None } else { Some(target.to_string()) },
            escalated_to: None,
        })
    }

    async fn propose_resolution(&self, action: &PlannedAction, initiative: &Initiative) -> covenant_chat::error::Result<ActionResult> {
        let message = format!(
            ":bulb: **Предложение по разрешению конфликта** (`{}`)\n\n{}\n\nЧто думаете? Напишите в этом треде.",
            action.contract_id, action.message_hint
        );
        let post_id = self.chat.send_to_channel(&message, initiative.thread_id.as_deref()).await?;
        Ok(ActionResult { action: "propose_resolution".into(), at: Utc::now().to_rfc3339(), post_id, contract_id: action.contract_id.clone(), target: None, escalated_to: None })
    }

    async fn partial_fix(&self, action: &PlannedAction, initiative: &Initiative) -> covenant_chat::error::Result<ActionResult> {
        let message = format!(":wrench: **Предложение по исправлению** (`{}`)\n\n{}\n\nСогласны с исправлением?", action.contract_id, action.message_hint);
        let post_id = self.chat.send_to_channel(&message, initiative.thread_id.as_deref()).await?;
        Ok(ActionResult { action: "partial_fix".into(), at: Utc::now().to_rfc3339(), post_id, contract_id: action.contract_id.clone(), target: None, escalated_to: None })
    }

    async fn follow_up(&self, action: &PlannedAction, initiative: &Initiative) -> covenant_chat::error::Result<ActionResult> {
        let targets: &[String] = if !initiative.waiting_for.is_empty() { &initiative.waiting_for } else { &initiative.stakeholders };
        let mentions = targets.iter().map(|s| format!("@{s}")).collect::<Vec<_>>().join(" ");
        let base = if action.message_hint.is_empty() {
            format!("Напоминаю об обсуждении контракта `{}`.", action.contract_id)
        } else {
            action.message_hint.clone()
        };
        let message = if mentions.is_empty() { base } else { format!("{mentions}, {base}") };

        let post_id = self.chat.send_to_channel(&message, initiative.thread_id.as_deref()).await?;
        Ok(ActionResult { action: "follow_up".into(), at: Utc::now().to_rfc3339(), post_id, contract_id: action.contract_id.clone(), target: None, escalated_to: None })
    }

    async fn escalate(&self, action: &PlannedAction, initiative: &Initiative) -> covenant_chat::error::Result<ActionResult> {
        let message = format!("@{}, нужна помощь с контрактом `{}`.\n\n{}", self.escalation_user, action.contract_id, action.message_hint);
        let post_id = self.chat.send_to_channel(&message, initiative.thread_id.as_deref()).await?;
        Ok(ActionResult {
            action: "escalate".into(),
            at: Utc::now().to_rfc3339(),
            post_id,
            contract_id: action.contract_id.clone(),
            target: None,
            escalated_to: Some(self.escalation_user.to_string()),
        })
    }
}

/// Permissive parse of the planner LLM's response: strips fenced code
/// blocks, then regex-extracts the first top-level JSON object on failure.
pub fn parse_plan_response(raw: &str) -> (String, Vec<PlannedAction>) {
    let stripped = strip_code_fence(raw);
    let value: Option<Value> = serde_json::from_str(&stripped).ok().or_else(|| extract_json_object(raw));
    let Some(value) = value else { return (String::new(), Vec::new()) };

    let analysis = value.get("analysis").and_then(Value::as_str).unwrap_or_default().to_string();
    let actions = value
        .get("actions")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|a| serde_json::from_value::<PlannedAction>(a.clone()).ok()).take(3).collect())
        .unwrap_or_default();

    (analysis, actions)
}

fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed.lines().filter(|l| !l.trim_start().starts_with("```")).collect::<Vec<_>>().join("\n")
}

fn extract_json_object(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plan_response_handles_code_fence() {
        let raw = "```json\n{\"analysis\": \"ok\", \"actions\": [{\"type\": \"start_thread\", \"contract_id\": \"mau\"}]}\n```";
        let (analysis, actions) = parse_plan_response(raw);
        assert_eq!(analysis, "ok");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].contract_id, "mau");
    }

    #[test]
    fn parse_plan_response_caps_at_three_actions() {
        let raw = serde_json::json!({
            "analysis": "",
            "actions": (0..5).map(|i| serde_json::json!({"type": "follow_up", "contract_id": format!("c{i}")})).collect::<Vec<_>>(),
        })
        .to_string();
        let (_, actions) = parse_plan_response(&raw);
        assert_eq!(actions.len(), 3);
    }

    #[test]
    fn parse_plan_response_yields_no_actions_on_garbage() {
        let (analysis, actions) = parse_plan_response("not json at all");
        assert!(analysis.is_empty());
        assert!(actions.is_empty());
    }

    #[test]
    fn strip_mention_drops_leading_at() {
        assert_eq!(strip_mention("@alice"), "alice");
        assert_eq!(strip_mention("alice"), "alice");
    }
}
