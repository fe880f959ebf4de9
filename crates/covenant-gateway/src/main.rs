//! Process entry point: wires the store, chat transport, and LLM providers
//! together and runs the three long-lived loops (§5) on one tokio runtime —
//! Listener in the foreground, Scheduler and Planner as background tasks.

use std::sync::Arc;

use covenant_agent::{Agent, Listener};
use covenant_chat::{ChatClient, ConsoleChatClient};
use covenant_core::Config;
use covenant_llm::build_providers;
use covenant_planner::ContinuousPlanner;
use covenant_scheduler::SchedulerEngine;
use covenant_store::{FileTreeStore, Store};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "covenant_gateway=info,covenant_agent=info,covenant_planner=info,covenant_scheduler=info".into()),
        )
        .init();

    let config_path = std::env::var("COVENANT_CONFIG").ok();
    let config = Config::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config load failed, using defaults");
        Config::default()
    });
    let config = Arc::new(config);

    info!(data_dir = %config.data_dir, "starting data contract agent gateway");

    let store: Arc<dyn Store> =
        Arc::new(FileTreeStore::new(config.data_dir(), config.write_max_retries, config.write_backoff_base));

    let chat = ConsoleChatClient::new("covenant-bot", "main");
    let chat_for_sends: Arc<dyn ChatClient> = Arc::new(chat.clone());
    let mut chat_for_polling = chat;
    chat_for_polling.connect().await?;

    let (cheap_provider, heavy_provider) = build_providers(&config);
    let cheap_provider: Arc<dyn covenant_llm::LlmProvider> = Arc::from(cheap_provider);
    let heavy_provider: Arc<dyn covenant_llm::LlmProvider> = Arc::from(heavy_provider);

    let agent = Arc::new(Agent::new(
        store.clone(),
        chat_for_sends.clone(),
        cheap_provider.clone(),
        heavy_provider.clone(),
        (*config).clone(),
    ));
    let listener = Listener::new(chat_for_sends.clone(), agent, store.clone(), &config);

    let scheduler = SchedulerEngine::new(
        store.clone(),
        chat_for_sends.clone(),
        cheap_provider.clone(),
        heavy_provider.clone(),
        config.clone(),
    );
    let planner = Arc::new(ContinuousPlanner::new(
        store.clone(),
        chat_for_sends.clone(),
        heavy_provider.clone(),
        config.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_shutdown = shutdown_rx.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

    let planner_shutdown = shutdown_rx.clone();
    let planner_task = tokio::spawn(async move { planner.run(planner_shutdown).await });

    // The listener has no shutdown channel of its own — like the reference
    // service's WebSocket loop, it just blocks until the stream ends. A
    // Ctrl+C races it instead of waiting for a clean stop.
    let mut listener_task = tokio::spawn(async move { listener.run(&mut chat_for_polling).await });

    tokio::select! {
        _ = &mut listener_task => {
            info!("chat listener exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = scheduler_task.await;
    let _ = planner_task.await;

    info!("data contract agent gateway stopped");
    Ok(())
}
