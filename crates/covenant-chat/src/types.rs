use serde::{Deserialize, Serialize};

/// The chat surface a message arrived on.
pub use covenant_core::ChannelKind;

/// An event delivered by the chat collaborator's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    Posted(PostedEvent),
    UserAdded(MembershipEvent),
    UserRemoved(MembershipEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedEvent {
    pub post_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub channel_kind: ChannelKind,
    pub message: String,
    pub root_id: Option<String>,
    /// e.g. `"system_add_to_channel"`, `"system_remove_from_channel"`, or
    /// `None` for an ordinary user post.
    pub post_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub user_id: String,
    pub channel_id: String,
}

/// A single message in a thread, as returned by `get_thread`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub create_at: String,
}

/// Basic identity info for a chat user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
}

/// Runtime connection state of the chat client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}
