//! Tuesday coverage scan: surfaces metrics tree nodes that are marked for
//! a contract but still unagreed, via the suggestion engine, capped to a
//! handful per run so the channel isn't flooded.

use chrono::Utc;
use covenant_chat::ChatClient;
use covenant_core::Config;
use covenant_governance::suggestions::{
    build_suggestion_records, can_suggest_today, coverage_scan, filter_already_suggested, format_coverage_message,
};
use covenant_store::Store;
use tracing::info;

use crate::error::Result;

const TREE_PATH: &str = "context/metrics_tree.md";
const CIRCLES_PATH: &str = "context/circles.md";
const DISPLAY_CAP: usize = 5;

pub async fn run_coverage_scan(store: &dyn Store, chat: &dyn ChatClient, config: &Config) -> Result<()> {
    let suggestions = store.get_suggestions()?;
    let now = Utc::now();
    if !can_suggest_today(&suggestions, now, config.suggestion_max_per_day) {
        info!("coverage scan skipped: daily suggestion cap reached");
        return Ok(());
    }

    let tree_md = store.read_file(TREE_PATH)?.unwrap_or_default();
    let circles_md = store.read_file(CIRCLES_PATH)?.unwrap_or_default();
    let contracts = store.list_contracts()?;
    let queue = store.get_queue()?;

    let candidates = coverage_scan(&tree_md, &contracts, &circles_md, &queue);
    let mut candidates = filter_already_suggested(
        candidates,
        &contracts,
        &suggestions,
        now,
        config.suggestion_cooldown_days,
        config.suggestion_dismiss_cooldown_days,
    );
    if candidates.is_empty() {
        return Ok(());
    }
    candidates.truncate(DISPLAY_CAP);

    let message = format_coverage_message(&candidates);
    chat.send_to_channel(&message, None).await?;

    let records = build_suggestion_records(&suggestions, &candidates, "coverage_scan", None, now);
    let mut all = suggestions;
    all.extend(records);
    store.save_suggestions(&all)?;

    info!(count = candidates.len(), "coverage scan posted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use covenant_chat::ConsoleChatClient;
    use covenant_store::FileTreeStore;

    use super::*;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path().to_path_buf(), 3, 0.01);
        (dir, store)
    }

    #[tokio::test]
    async fn posts_an_uncovered_metric_and_records_the_suggestion() {
        let (_dir, store) = store();
        store.write_file(TREE_PATH, "└── Retention ← DATA CONTRACT").unwrap();
        store.write_file(CIRCLES_PATH, "## Customer Success\nОтветственный: @maria\n").unwrap();
        let chat = ConsoleChatClient::new("bot", "general");
        let config = Config::default();

        run_coverage_scan(&store, &chat, &config).await.unwrap();

        assert_eq!(chat.sent_messages().len(), 1);
        let suggestions = store.get_suggestions().unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].trigger, "coverage_scan");
    }

    #[tokio::test]
    async fn daily_cap_skips_the_scan() {
        let (_dir, store) = store();
        store.write_file(TREE_PATH, "└── Retention ← DATA CONTRACT").unwrap();
        let mut config = Config::default();
        config.suggestion_max_per_day = 1;
        store
            .save_suggestions(&[covenant_store::types::SuggestionRecord {
                id: "sug_today_001".to_string(),
                contract_id: "other".to_string(),
                metric_name: None,
                trigger: "coverage_scan".to_string(),
                suggested_at: Utc::now().to_rfc3339(),
                thread_id: None,
                status: "suggested".to_string(),
                status_updated_at: None,
            }])
            .unwrap();
        let chat = ConsoleChatClient::new("bot", "general");

        run_coverage_scan(&store, &chat, &config).await.unwrap();

        assert!(chat.sent_messages().is_empty());
    }
}
