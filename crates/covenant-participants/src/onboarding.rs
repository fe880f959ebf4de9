//! First-contact profile creation and the welcome DM side effect, fired
//! when the Agent sees a message from a user with no existing profile.

use chrono::Utc;
use covenant_chat::ChatClient;
use covenant_store::Store;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::types::{render_onboard_welcome, render_participant_profile};

/// Creates a minimal participant profile, marks the user active and
/// onboarded, and sends a welcome DM. A no-op if a profile already exists
/// (idempotent against duplicate onboarding attempts on retry/reconnect).
pub async fn onboard_participant(
    store: &dyn Store,
    chat: &dyn ChatClient,
    user_id: &str,
    username: &str,
    display_name: &str,
) -> Result<()> {
    if store.get_participant(username)?.is_some() {
        info!(username, "participant already has a profile, skipping onboard");
        return Ok(());
    }

    let now = Utc::now().format("%Y-%m-%d").to_string();
    let display = if display_name.is_empty() { username } else { display_name };

    // Best-effort: a profile should still be created even if the index
    // update fails for some reason.
    if let Err(e) = store.set_participant_active(username, true) {
        warn!(username, error = %e, "failed to mark participant active during onboarding");
    }
    if let Err(e) = store.set_participant_onboarded(username, true) {
        warn!(username, error = %e, "failed to mark participant onboarded during onboarding");
    }

    let profile = render_participant_profile(display, username, &now);
    store.update_participant(username, &profile)?;
    info!(username, "created participant profile");

    let welcome = render_onboard_welcome(display);
    match chat.send_dm(user_id, &welcome, None).await {
        Ok(_) => info!(username, "sent onboard DM"),
        Err(e) => error!(username, error = %e, "failed to send onboard DM"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use covenant_chat::console::ConsoleChatClient;
    use covenant_store::FileTreeStore;

    use super::*;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        (dir, store)
    }

    #[tokio::test]
    async fn onboards_new_participant_and_sends_welcome() {
        let (_dir, store) = store();
        let chat = ConsoleChatClient::new("bot", "general");

        onboard_participant(&store, &chat, "u1", "alice", "Alice").await.unwrap();

        assert!(store.get_participant("alice").unwrap().is_some());
        assert!(store.is_participant_active("alice").unwrap());
        assert!(store.is_participant_onboarded("alice").unwrap());
        assert_eq!(chat.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn skips_onboarding_when_profile_already_exists() {
        let (_dir, store) = store();
        let chat = ConsoleChatClient::new("bot", "general");
        store.update_participant("alice", "existing profile").unwrap();

        onboard_participant(&store, &chat, "u1", "alice", "Alice").await.unwrap();

        assert_eq!(store.get_participant("alice").unwrap().unwrap(), "existing profile");
        assert!(chat.sent_messages().is_empty());
    }
}
