pub mod client;
pub mod console;
pub mod error;
pub mod manager;
pub mod types;

pub use client::ChatClient;
pub use console::ConsoleChatClient;
pub use error::{ChatError, Result};
pub use manager::ReconnectingClient;
pub use types::{ChatEvent, MembershipEvent, PostedEvent};
