use async_trait::async_trait;

use crate::{
    error::Result,
    types::{ChatEvent, ConnectionStatus, ThreadMessage, UserInfo},
};

/// The chat transport boundary. Exactly one implementation is active at a
/// time (unlike the teacher's multi-adapter `ChannelManager` — this system
/// talks to a single configured channel), but the trait keeps the concrete
/// transport (Mattermost, Slack, a local console) out of every other crate.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Establish the connection to the external service.
    async fn connect(&mut self) -> Result<()>;

    /// Gracefully close the connection.
    async fn disconnect(&mut self) -> Result<()>;

    /// Pull the next event off the stream, blocking until one arrives or the
    /// connection drops. Returns `Ok(None)` when the stream has ended
    /// cleanly (e.g. after `disconnect`).
    async fn next_event(&mut self) -> Result<Option<ChatEvent>>;

    /// Post a message to the configured channel, optionally as a thread
    /// reply. Returns the new post's id.
    async fn send_to_channel(&self, message: &str, root_id: Option<&str>) -> Result<String>;

    /// Send a direct message to a user, optionally as a thread reply.
    /// Returns the new post's id.
    async fn send_dm(&self, user_id: &str, message: &str, root_id: Option<&str>)
        -> Result<String>;

    /// Fetch every message in a thread, oldest first.
    async fn get_thread(&self, post_id: &str) -> Result<Vec<ThreadMessage>>;

    /// Resolve a user id to basic identity info.
    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo>;

    /// Resolve a display name or partial username to a canonical username,
    /// if exactly one match is found.
    async fn resolve_username(&self, display_or_partial: &str) -> Result<Option<String>>;

    /// The bot's own user id, used to filter out its own posts.
    fn bot_user_id(&self) -> &str;

    /// The single channel this client is configured to operate in.
    fn channel_id(&self) -> &str;

    /// Current connection state, for health reporting.
    fn status(&self) -> ConnectionStatus;
}
