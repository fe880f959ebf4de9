//! Friday weekly digest: one heavy-model call summarizing the contracts
//! index, queue, and open reminders, posted to the main channel.

use covenant_chat::ChatClient;
use covenant_core::Config;
use covenant_llm::{ChatRequest, LlmProvider, Message, Role};
use covenant_store::Store;
use tracing::info;

use crate::error::Result;

const DIGEST_TEMPLATE_PATH: &str = "prompts/digest_template.md";
const SYSTEM_PROMPT_PATH: &str = "prompts/system_short.md";

pub async fn run_weekly_digest(store: &dyn Store, chat: &dyn ChatClient, llm_heavy: &dyn LlmProvider, config: &Config) -> Result<()> {
    let contracts = store.list_contracts()?;
    let queue = store.get_queue()?;
    let reminders = store.get_reminders()?;

    let template = store.read_file(DIGEST_TEMPLATE_PATH)?.unwrap_or_default();
    let user_msg = template
        .replace("{contracts_index}", &format_json(&contracts))
        .replace("{queue}", &format_json(&queue))
        .replace("{reminders}", &format_json(&reminders));

    let system = store.read_file(SYSTEM_PROMPT_PATH)?.unwrap_or_default();
    let req = ChatRequest {
        messages: vec![Message { role: Role::User, content: user_msg }],
        ..ChatRequest::new(&config.llm_heavy_model, system, 1500)
    };

    let response = llm_heavy.send(&req).await?;
    chat.send_to_channel(&response.content, None).await?;
    info!("weekly digest published");
    Ok(())
}

fn format_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use covenant_chat::ConsoleChatClient;
    use covenant_llm::{ChatResponse, ProviderError};
    use covenant_store::FileTreeStore;

    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: format!("digest for {}", req.model),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn posts_the_heavy_models_response_to_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path().to_path_buf(), 3, 0.01);
        let chat = ConsoleChatClient::new("bot", "general");
        let config = Config::default();

        run_weekly_digest(&store, &chat, &EchoProvider, &config).await.unwrap();

        let sent = chat.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains("digest for"));
    }
}
