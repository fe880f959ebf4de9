use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::{
    client::ChatClient,
    error::Result,
    types::{ChatEvent, ConnectionStatus, ThreadMessage, UserInfo},
};

struct Inner {
    bot_user_id: String,
    channel_id: String,
    status: Mutex<ConnectionStatus>,
    pending: Mutex<VecDeque<ChatEvent>>,
    sent: Mutex<Vec<(String, Option<String>, String)>>,
    next_post_id: Mutex<u64>,
}

/// A local stdout/stdin-free chat adapter for manual operation and
/// integration tests: `send_to_channel`/`send_dm` just log, `next_event`
/// drains a queue callers push onto directly. No concrete chat-platform
/// SDK is linked anywhere in this workspace.
///
/// Cloning shares the underlying queues and connection state (`Arc`
/// internally) — the gateway binary keeps one clone behind `Arc<dyn
/// ChatClient>` for sends and a second, separately owned clone for the
/// event-polling loop, since [`ChatClient::next_event`] needs `&mut self`.
#[derive(Clone)]
pub struct ConsoleChatClient {
    inner: Arc<Inner>,
}

impl ConsoleChatClient {
    pub fn new(bot_user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bot_user_id: bot_user_id.into(),
                channel_id: channel_id.into(),
                status: Mutex::new(ConnectionStatus::Disconnected),
                pending: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                next_post_id: Mutex::new(1),
            }),
        }
    }

    /// Queue an event to be returned by the next `next_event` call — the
    /// test-facing equivalent of an incoming webhook delivery.
    pub fn push_event(&self, event: ChatEvent) {
        self.inner.pending.lock().unwrap().push_back(event);
    }

    /// Every `(recipient, root_id, message)` tuple sent so far, in order.
    pub fn sent_messages(&self) -> Vec<(String, Option<String>, String)> {
        self.inner.sent.lock().unwrap().clone()
    }

    fn next_id(&self) -> String {
        let mut n = self.inner.next_post_id.lock().unwrap();
        let id = format!("post_{n}");
        *n += 1;
        id
    }
}

#[async_trait]
impl ChatClient for ConsoleChatClient {
    async fn connect(&mut self) -> Result<()> {
        *self.inner.status.lock().unwrap() = ConnectionStatus::Connected;
        info!(channel_id = %self.inner.channel_id, "console chat client connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.inner.status.lock().unwrap() = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        Ok(self.inner.pending.lock().unwrap().pop_front())
    }

    async fn send_to_channel(&self, message: &str, root_id: Option<&str>) -> Result<String> {
        let id = self.next_id();
        self.inner.sent.lock().unwrap().push((
            self.inner.channel_id.clone(),
            root_id.map(String::from),
            message.to_string(),
        ));
        info!(channel_id = %self.inner.channel_id, post_id = %id, "console: posted to channel");
        Ok(id)
    }

    async fn send_dm(
        &self,
        user_id: &str,
        message: &str,
        root_id: Option<&str>,
    ) -> Result<String> {
        let id = self.next_id();
        self.inner.sent.lock().unwrap().push((
            user_id.to_string(),
            root_id.map(String::from),
            message.to_string(),
        ));
        info!(user_id, post_id = %id, "console: sent DM");
        Ok(id)
    }

    async fn get_thread(&self, _post_id: &str) -> Result<Vec<ThreadMessage>> {
        Ok(Vec::new())
    }

    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo> {
        Ok(UserInfo {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            display_name: user_id.to_string(),
        })
    }

    async fn resolve_username(&self, display_or_partial: &str) -> Result<Option<String>> {
        Ok(Some(display_or_partial.to_lowercase()))
    }

    fn bot_user_id(&self) -> &str {
        &self.inner.bot_user_id
    }

    fn channel_id(&self) -> &str {
        &self.inner.channel_id
    }

    fn status(&self) -> ConnectionStatus {
        self.inner.status.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelKind, PostedEvent};

    #[tokio::test]
    async fn connect_then_send_round_trips() {
        let mut client = ConsoleChatClient::new("bot", "general");
        client.connect().await.unwrap();
        let id = client.send_to_channel("hello", None).await.unwrap();
        assert_eq!(id, "post_1");
        assert_eq!(client.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn queued_events_drain_in_order() {
        let mut client = ConsoleChatClient::new("bot", "general");
        client.push_event(ChatEvent::Posted(PostedEvent {
            post_id: "p1".into(),
            user_id: "u1".into(),
            channel_id: "general".into(),
            channel_kind: ChannelKind::Channel,
            message: "hi".into(),
            root_id: None,
            post_type: None,
        }));
        let ev = client.next_event().await.unwrap();
        assert!(matches!(ev, Some(ChatEvent::Posted(_))));
        assert!(client.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clones_share_underlying_state() {
        let client = ConsoleChatClient::new("bot", "general");
        let sender_handle = client.clone();
        let mut poller_handle = client;

        sender_handle.send_to_channel("hi", None).await.unwrap();
        assert_eq!(poller_handle.sent_messages().len(), 1);

        poller_handle.connect().await.unwrap();
        assert!(matches!(sender_handle.status(), ConnectionStatus::Connected));
    }
}
