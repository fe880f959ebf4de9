use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::{client::ChatClient, error::Result, types::ChatEvent};

/// Minimum delay between reconnect attempts (seconds).
const BACKOFF_BASE_SECS: u64 = 1;
/// Maximum delay between reconnect attempts — §6's "cap 60s".
const BACKOFF_MAX_SECS: u64 = 60;

/// Drives a single [`ChatClient`], reconnecting with exponential backoff
/// (capped at 60s) whenever the connection drops, and logging-and-dropping
/// sends that fail after the transport is gone rather than retrying forever.
pub struct ReconnectingClient<C: ChatClient> {
    inner: C,
}

impl<C: ChatClient> ReconnectingClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub async fn connect(&mut self) -> Result<()> {
        connect_with_backoff(&mut self.inner).await
    }

    /// Pull the next event, transparently reconnecting on a dropped
    /// connection. Returns `Ok(None)` only after a clean `disconnect`.
    pub async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        loop {
            match self.inner.next_event().await {
                Ok(ev) => return Ok(ev),
                Err(e) => {
                    warn!(error = %e, "chat event stream dropped, reconnecting");
                    connect_with_backoff(&mut self.inner).await?;
                }
            }
        }
    }

    /// Best-effort send: logs and swallows the error rather than retrying,
    /// per the interrupted-send design note — a dropped reply should never
    /// wedge the caller's event loop.
    pub async fn send_to_channel(&self, message: &str, root_id: Option<&str>) {
        if let Err(e) = self.inner.send_to_channel(message, root_id).await {
            error!(error = %e, "dropping channel send after failure");
        }
    }

    pub async fn send_dm(&self, user_id: &str, message: &str, root_id: Option<&str>) {
        if let Err(e) = self.inner.send_dm(user_id, message, root_id).await {
            error!(user_id, error = %e, "dropping DM send after failure");
        }
    }
}

async fn connect_with_backoff<C: ChatClient>(client: &mut C) -> Result<()> {
    let mut delay_secs = BACKOFF_BASE_SECS;
    loop {
        match client.connect().await {
            Ok(()) => {
                info!("chat client connected");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, retry_after_secs = delay_secs, "chat connect failed, retrying");
                sleep(Duration::from_secs(delay_secs)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }
}
