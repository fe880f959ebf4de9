use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("store error: {0}")]
    Store(#[from] covenant_store::error::StoreError),

    #[error("chat error: {0}")]
    Chat(#[from] covenant_chat::error::ChatError),

    #[error("llm error: {0}")]
    Llm(#[from] covenant_llm::ProviderError),

    #[error("participants error: {0}")]
    Participants(#[from] covenant_participants::ParticipantError),

    #[error("threads error: {0}")]
    Threads(#[from] covenant_threads::ThreadsError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
