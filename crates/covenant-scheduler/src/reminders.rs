//! The dunning ladder: escalating reminders for contracts stuck waiting on
//! a single person, five steps from a soft nudge to a controller page.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use covenant_chat::ChatClient;
use covenant_core::Config;
use covenant_llm::{ChatRequest, LlmProvider, Message, Role};
use covenant_store::{types::Reminder, Store};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::templates::apply_template;

const TEMPLATES_PATH: &str = "prompts/reminder_templates.md";

/// Advances every due reminder by one escalation step and persists the
/// updated ladder. Errors sending an individual reminder are logged and
/// do not stop the pass.
pub async fn run_reminder_pass(
    store: &dyn Store,
    chat: &dyn ChatClient,
    llm_cheap: &dyn LlmProvider,
    config: &Config,
) -> Result<()> {
    let mut reminders = store.get_reminders()?;
    if reminders.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let templates = store.read_file(TEMPLATES_PATH)?.unwrap_or_default();
    let mut updated = false;

    for rem in reminders.iter_mut() {
        let Ok(next_dt) = DateTime::parse_from_rfc3339(&rem.next_reminder) else { continue };
        if next_dt.with_timezone(&Utc) > now {
            continue;
        }

        if let Err(e) =
            fire_step(store, chat, llm_cheap, &templates, rem, now, &config.escalation_user, &config.llm_cheap_model).await
        {
            error!(contract_id = %rem.contract_id, "reminder step failed: {e}");
            continue;
        }

        rem.last_reminder = Some(now.to_rfc3339());
        rem.next_reminder = (now + Duration::days(config.reminder_default_interval_days)).to_rfc3339();
        updated = true;

        info!(contract_id = %rem.contract_id, target = %rem.target_user, step = rem.escalation_step, "reminder sent");
    }

    if updated {
        store.save_reminders(&reminders)?;
    }
    Ok(())
}

async fn fire_step(
    store: &dyn Store,
    chat: &dyn ChatClient,
    llm_cheap: &dyn LlmProvider,
    templates: &str,
    rem: &mut Reminder,
    now: DateTime<Utc>,
    escalation_user: &str,
    cheap_model: &str,
) -> Result<()> {
    let question = rem.question_summary.clone().unwrap_or_default();

    match rem.escalation_step {
        1 => {
            let base = format!(
                "@{}, напоминаю — жду твоё мнение по {}. Можешь ответить коротко, даже одним предложением.",
                rem.target_user, rem.contract_id
            );
            let ctx = ctx(&[
                ("TARGET_USER", format!("@{}", rem.target_user)),
                ("TARGET_USERNAME", rem.target_user.clone()),
                ("CONTRACT_ID", rem.contract_id.clone()),
                ("QUESTION", question),
            ]);
            let message = apply_template(templates, "{SOFT_REMINDER}", &base, &ctx);
            send_to_thread(chat, rem.thread_id.as_deref(), &message).await?;
            rem.escalation_step = 2;
        }

        2 => {
            let (option_a, option_b) = resolve_options(store, llm_cheap, cheap_model, &rem.contract_id, &question).await;
            let base = format!(
                "@{}, упрощу. Два варианта:\nA — {option_a}\nB — {option_b}\nНапиши A или B, я дальше сам оформлю.",
                rem.target_user
            );
            let ctx = ctx(&[
                ("TARGET_USER", format!("@{}", rem.target_user)),
                ("TARGET_USERNAME", rem.target_user.clone()),
                ("CONTRACT_ID", rem.contract_id.clone()),
                ("QUESTION", question),
                ("OPTION_A", option_a),
                ("OPTION_B", option_b),
            ]);
            let message = apply_template(templates, "{AB_REMINDER}", &base, &ctx);
            send_to_thread(chat, rem.thread_id.as_deref(), &message).await?;
            rem.escalation_step = 3;
        }

        3 => {
            let base = format!(
                "Привет. В канале Data Contracts жду твой ответ по {} — это блокирует согласование. Можешь ответить прямо здесь.",
                rem.contract_id
            );
            let ctx = ctx(&[
                ("TARGET_USER", format!("@{}", rem.target_user)),
                ("TARGET_USERNAME", rem.target_user.clone()),
                ("CONTRACT_ID", rem.contract_id.clone()),
                ("QUESTION", question),
            ]);
            let message = apply_template(templates, "{DM_REMINDER}", &base, &ctx);
            if let Some(ref user_id) = rem.target_mm_user_id {
                if let Err(e) = chat.send_dm(user_id, &message, None).await {
                    warn!(target = %rem.target_user, "failed to send DM reminder: {e}");
                }
            }
            rem.escalation_step = 4;
        }

        _ => {
            let days = rem
                .first_asked
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| now.signed_duration_since(dt.with_timezone(&Utc)).num_days())
                .unwrap_or(0);

            let base = format!(
                "@{escalation_user}, контракт {} заблокирован {days} дней. Жду ответа от @{}. Нужна помощь.",
                rem.contract_id, rem.target_user
            );
            let ctx = ctx(&[
                ("ESCALATION_USER", format!("@{escalation_user}")),
                ("TARGET_USER", format!("@{}", rem.target_user)),
                ("TARGET_USERNAME", rem.target_user.clone()),
                ("CONTRACT_ID", rem.contract_id.clone()),
                ("DAYS_BLOCKED", days.to_string()),
                ("QUESTION", question),
            ]);
            let message = apply_template(templates, "{ESCALATION_REMINDER}", &base, &ctx);
            send_to_thread(chat, rem.thread_id.as_deref(), &message).await?;
            rem.escalation_step = 5;
        }
    }

    Ok(())
}

fn ctx(pairs: &[(&'static str, String)]) -> HashMap<&'static str, String> {
    pairs.iter().cloned().collect()
}

async fn send_to_thread(chat: &dyn ChatClient, thread_id: Option<&str>, message: &str) -> Result<()> {
    chat.send_to_channel(message, thread_id).await?;
    Ok(())
}

/// A/B simplification: reuse the discussion's proposed resolution if one
/// was already captured, otherwise ask the cheap model for two options.
async fn resolve_options(
    store: &dyn Store,
    llm_cheap: &dyn LlmProvider,
    cheap_model: &str,
    contract_id: &str,
    question: &str,
) -> (String, String) {
    if let Ok(Some(discussion)) = store.get_discussion(contract_id) {
        if let Some(resolution) = discussion.get("proposed_resolution").and_then(|v| v.as_str()) {
            if !resolution.is_empty() {
                return (resolution.to_string(), "Другой вариант (опиши)".to_string());
            }
        }
    }

    let prompt = format!(
        "Сформулируй два простых варианта для вопроса: {question}\nКонтракт: {contract_id}\nФормат: A — ...\nB — ..."
    );
    let req = ChatRequest {
        messages: vec![Message { role: Role::User, content: prompt }],
        ..ChatRequest::new(cheap_model, "Ты помощник. Сформулируй кратко.", 300)
    };

    match llm_cheap.send(&req).await {
        Ok(resp) => split_options(&resp.content),
        Err(e) => {
            warn!("cheap model call for reminder options failed: {e}");
            (String::new(), String::new())
        }
    }
}

fn split_options(text: &str) -> (String, String) {
    let mut a = String::new();
    let mut b = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('A') {
            a = trimmed.split('—').nth(1).unwrap_or("").trim().to_string();
        } else if trimmed.starts_with('B') {
            b = trimmed.split('—').nth(1).unwrap_or("").trim().to_string();
        }
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use covenant_chat::ConsoleChatClient;
    use covenant_llm::ProviderError;
    use covenant_store::FileTreeStore;

    use super::*;

    struct NullProvider;

    #[async_trait]
    impl LlmProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }
        async fn send(&self, _req: &ChatRequest) -> std::result::Result<covenant_llm::ChatResponse, ProviderError> {
            Ok(covenant_llm::ChatResponse {
                content: "A — вариант один\nB — вариант два".to_string(),
                model: "null".to_string(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path().to_path_buf(), 3, 0.01);
        (dir, store)
    }

    fn due_reminder(step: u8) -> Reminder {
        Reminder {
            contract_id: "headcount".to_string(),
            target_user: "ivan".to_string(),
            target_mm_user_id: Some("u1".to_string()),
            thread_id: Some("root_1".to_string()),
            question_summary: Some("какая формула?".to_string()),
            escalation_step: step,
            next_reminder: (Utc::now() - Duration::hours(1)).to_rfc3339(),
            last_reminder: None,
            first_asked: Some((Utc::now() - Duration::days(5)).to_rfc3339()),
        }
    }

    #[tokio::test]
    async fn step_one_sends_a_soft_nudge_and_advances_to_step_two() {
        let (_dir, store) = store();
        let chat = ConsoleChatClient::new("bot", "general");
        let llm = NullProvider;
        let config = Config::default();
        store.save_reminders(&[due_reminder(1)]).unwrap();

        run_reminder_pass(&store, &chat, &llm, &config).await.unwrap();

        let reminders = store.get_reminders().unwrap();
        assert_eq!(reminders[0].escalation_step, 2);
        assert_eq!(chat.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn step_four_escalates_and_clamps_at_five() {
        let (_dir, store) = store();
        let chat = ConsoleChatClient::new("bot", "general");
        let llm = NullProvider;
        let config = Config::default();
        store.save_reminders(&[due_reminder(4)]).unwrap();

        run_reminder_pass(&store, &chat, &llm, &config).await.unwrap();

        let reminders = store.get_reminders().unwrap();
        assert_eq!(reminders[0].escalation_step, 5);
        let sent = chat.sent_messages();
        assert!(sent[0].2.contains("заблокирован"));
    }

    #[tokio::test]
    async fn not_yet_due_reminder_is_left_untouched() {
        let (_dir, store) = store();
        let chat = ConsoleChatClient::new("bot", "general");
        let llm = NullProvider;
        let config = Config::default();
        let mut rem = due_reminder(1);
        rem.next_reminder = (Utc::now() + Duration::hours(1)).to_rfc3339();
        store.save_reminders(&[rem]).unwrap();

        run_reminder_pass(&store, &chat, &llm, &config).await.unwrap();

        let reminders = store.get_reminders().unwrap();
        assert_eq!(reminders[0].escalation_step, 1);
        assert!(chat.sent_messages().is_empty());
    }
}
