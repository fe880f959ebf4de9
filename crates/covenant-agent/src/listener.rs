//! Drives the chat event stream: de-dups posts, handles membership events,
//! triggers onboarding, and dispatches everything else to [`Agent`].

use std::sync::Arc;

use covenant_chat::{ChatClient, ChatEvent};
use covenant_core::{ChannelKind, Config};
use covenant_store::Store;
use regex::Regex;
use tracing::{error, info, warn};

use crate::agent::Agent;

fn mention_regex() -> Regex {
    Regex::new(r"@([a-zA-Z0-9._-]+)").expect("valid mention regex")
}

const REAL_REQUEST_KEYWORDS: &[&str] = &[
    "контракт", "статус", "начни", "покажи", "очеред", "план", "расхожд", "проблем", "сохрани",
    "сохран", "зафикс", "обнов", "создай", "создать", "аудит", "конфликт", "проверь", "reminder",
    "дайджест", "digest",
];

fn looks_like_real_request(message: &str) -> bool {
    if message.contains('?') {
        return true;
    }
    let low = message.to_lowercase();
    REAL_REQUEST_KEYWORDS.iter().any(|k| low.contains(k))
}

pub struct Listener {
    chat: Arc<dyn ChatClient>,
    agent: Arc<Agent>,
    store: Arc<dyn Store>,
    dedup: covenant_threads::PostDedupGuard,
}

impl Listener {
    pub fn new(chat: Arc<dyn ChatClient>, agent: Arc<Agent>, store: Arc<dyn Store>, config: &Config) -> Self {
        let dedup = covenant_threads::PostDedupGuard::hydrate(store.as_ref(), config.dedup_max_entries, config.dedup_ttl_seconds)
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to hydrate dedup guard, starting empty");
                covenant_threads::PostDedupGuard::new(config.dedup_max_entries)
            });
        Self { chat, agent, store, dedup }
    }

    /// Pulls events off the chat stream until it ends (disconnect, or the
    /// transport closes cleanly).
    pub async fn run(&self, chat: &mut dyn ChatClient) {
        loop {
            match chat.next_event().await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => {
                    info!("chat event stream ended");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "error reading next chat event");
                }
            }
        }
    }

    async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Posted(post) => self.handle_posted(post).await,
            ChatEvent::UserAdded(m) => self.handle_user_added(m).await,
            ChatEvent::UserRemoved(m) => self.handle_user_removed(m).await,
        }
    }

    async fn handle_posted(&self, post: covenant_chat::PostedEvent) {
        if post.user_id == self.chat.bot_user_id() {
            return;
        }

        let message = post.message.trim().to_string();

        if let Some(post_type) = post.post_type.as_deref() {
            if post.channel_id == self.chat.channel_id()
                && (post_type == "system_add_to_channel" || post_type == "system_remove_from_channel")
            {
                self.handle_system_membership_post(post_type, &message).await;
                return;
            }
        }

        if message.is_empty() {
            return;
        }

        if !self.dedup.try_admit(&post.post_id) {
            return;
        }

        let channel_kind = if post.channel_kind == ChannelKind::Dm {
            ChannelKind::Dm
        } else if post.channel_id == self.chat.channel_id() {
            ChannelKind::Channel
        } else {
            return;
        };

        let username = match self.chat.get_user_info(&post.user_id).await {
            Ok(info) => info.username,
            Err(e) => {
                warn!(user_id = %post.user_id, error = %e, "failed to resolve user info");
                "unknown".to_string()
            }
        };

        if channel_kind == ChannelKind::Channel {
            let already_known = self.store.get_participant(&username).ok().flatten().is_some()
                || self.store.is_participant_onboarded(&username).unwrap_or(false);

            if !already_known {
                if let Ok(info) = self.chat.get_user_info(&post.user_id).await {
                    self.agent.onboard_participant(&post.user_id, &info.username, &info.display_name).await;

                    let thread_root = post.root_id.clone().unwrap_or_else(|| post.post_id.clone());
                    let _ = self
                        .chat
                        .send_to_channel(
                            &format!("@{username}, я написал(а) тебе в личку 3 коротких вопроса для профиля. Ответь там — и продолжим."),
                            Some(&thread_root),
                        )
                        .await;

                    if !looks_like_real_request(&message) && message.chars().count() <= 120 {
                        self.mark_processed(&post.post_id);
                        return;
                    }
                }
            }
        }

        info!(post_id = %post.post_id, root_id = ?post.root_id, username, ?channel_kind, "processing message");

        let reply = self.agent.process_message(&username, &message, channel_kind, post.root_id.as_deref()).await;

        if !reply.text.is_empty() {
            let send_result = if channel_kind == ChannelKind::Dm {
                self.chat.send_dm(&post.user_id, &reply.text, None).await
            } else {
                let thread_root = reply.thread_root.clone().unwrap_or_else(|| post.post_id.clone());
                self.chat.send_to_channel(&reply.text, Some(&thread_root)).await
            };
            if let Err(e) = send_result {
                error!(post_id = %post.post_id, error = %e, "failed to send reply");
            }
        }

        self.mark_processed(&post.post_id);
    }

    fn mark_processed(&self, post_id: &str) {
        if let Err(e) = self.dedup.mark_processed(self.store.as_ref(), post_id) {
            warn!(post_id, error = %e, "failed to persist dedup state");
        }
    }

    async fn handle_system_membership_post(&self, post_type: &str, message: &str) {
        let usernames: Vec<String> = mention_regex().captures_iter(message).map(|c| c[1].to_string()).collect();
        if usernames.is_empty() {
            return;
        }

        if post_type == "system_add_to_channel" {
            for uname in &usernames {
                let Ok(Some(canonical)) = self.chat.resolve_username(uname).await else { continue };
                let _ = self.store.set_participant_active(&canonical, true);
                self.agent.onboard_participant(&canonical, &canonical, &canonical).await;
            }

            let mentions = usernames.iter().take(8).map(|u| format!("@{u}")).collect::<Vec<_>>().join(" ");
            let more = if usernames.len() > 8 { format!(" и ещё {}", usernames.len() - 8) } else { String::new() };
            let _ = self
                .chat
                .send_to_channel(&format!("Добро пожаловать, {mentions}{more}! Я написал(а) вам в личку 3 коротких вопроса для онбординга."), None)
                .await;
        } else {
            for uname in &usernames {
                let _ = self.store.set_participant_active(uname, false);
            }
            info!(usernames = usernames.join(","), "system removal processed");
        }
    }

    async fn handle_user_added(&self, m: covenant_chat::MembershipEvent) {
        if m.channel_id != self.chat.channel_id() || m.user_id == self.chat.bot_user_id() {
            return;
        }
        let Ok(info) = self.chat.get_user_info(&m.user_id).await else {
            error!(user_id = %m.user_id, "failed to resolve user info for user_added event");
            return;
        };
        self.agent.onboard_participant(&m.user_id, &info.username, &info.display_name).await;
        let _ = self
            .chat
            .send_to_channel(
                &format!("Добро пожаловать, @{}! Я написал(а) тебе в личку 3 коротких вопроса для онбординга.", info.username),
                None,
            )
            .await;
    }

    async fn handle_user_removed(&self, m: covenant_chat::MembershipEvent) {
        if m.channel_id != self.chat.channel_id() || m.user_id == self.chat.bot_user_id() {
            return;
        }
        match self.chat.get_user_info(&m.user_id).await {
            Ok(info) => {
                let _ = self.store.set_participant_active(&info.username, false);
                info!(username = info.username, "participant removed from channel");
            }
            Err(e) => error!(user_id = %m.user_id, error = %e, "failed to handle user_removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_request_detected_by_keyword() {
        assert!(looks_like_real_request("покажи статус контракта mau"));
        assert!(!looks_like_real_request("привет"));
    }

    #[test]
    fn real_request_detected_by_question_mark() {
        assert!(looks_like_real_request("а что такое mau?"));
    }

    #[test]
    fn mention_regex_extracts_multiple_usernames() {
        let names: Vec<String> = mention_regex().captures_iter("@alice and @bob.smith added").map(|c| c[1].to_string()).collect();
        assert_eq!(names, vec!["alice".to_string(), "bob.smith".to_string()]);
    }
}
