use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("store error: {0}")]
    Store(#[from] covenant_store::error::StoreError),

    #[error("chat error: {0}")]
    Chat(#[from] covenant_chat::error::ChatError),

    #[error("llm error: {0}")]
    Llm(#[from] covenant_llm::ProviderError),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
