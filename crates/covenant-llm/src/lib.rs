pub mod anthropic;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod tools;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolCall, ToolDefinition};
pub use retry::RetryingProvider;
pub use tools::{tool_loop::run_tool_loop, Tool, ToolResult};

/// Build the heavy-model and cheap-model providers from configuration,
/// each wrapped in linear-backoff retry.
pub fn build_providers(
    config: &covenant_core::Config,
) -> (Box<dyn LlmProvider>, Box<dyn LlmProvider>) {
    let heavy = build_provider(
        &config.llm_heavy_provider,
        &config.anthropic_api_key,
        config.anthropic_base_url.clone(),
        &config.openai_api_key,
        config.openai_base_url.clone(),
    );
    let cheap = build_provider(
        &config.llm_cheap_provider,
        &config.anthropic_api_key,
        config.anthropic_base_url.clone(),
        &config.openai_api_key,
        config.openai_base_url.clone(),
    );

    let heavy: Box<dyn LlmProvider> = Box::new(RetryingProvider::new(
        heavy,
        config.llm_max_retries,
        config.llm_retry_backoff_base,
    ));
    let cheap: Box<dyn LlmProvider> = Box::new(RetryingProvider::new(
        cheap,
        config.llm_max_retries,
        config.llm_retry_backoff_base,
    ));
    (cheap, heavy)
}

enum EitherProvider {
    Anthropic(AnthropicProvider),
    OpenAi(OpenAiProvider),
}

#[async_trait::async_trait]
impl LlmProvider for EitherProvider {
    fn name(&self) -> &str {
        match self {
            EitherProvider::Anthropic(p) => p.name(),
            EitherProvider::OpenAi(p) => p.name(),
        }
    }
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        match self {
            EitherProvider::Anthropic(p) => p.send(req).await,
            EitherProvider::OpenAi(p) => p.send(req).await,
        }
    }
}

fn build_provider(
    provider_name: &str,
    anthropic_key: &str,
    anthropic_base_url: Option<String>,
    openai_key: &str,
    openai_base_url: Option<String>,
) -> EitherProvider {
    match provider_name {
        "openai" => EitherProvider::OpenAi(OpenAiProvider::new(openai_key.to_string(), openai_base_url)),
        _ => EitherProvider::Anthropic(AnthropicProvider::new(anthropic_key.to_string(), anthropic_base_url)),
    }
}
