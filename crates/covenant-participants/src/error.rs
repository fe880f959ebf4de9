use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParticipantError {
    #[error("role and username are both required")]
    MissingRoleOrUsername,

    #[error("store error: {0}")]
    Store(#[from] covenant_store::error::StoreError),

    #[error("chat error: {0}")]
    Chat(#[from] covenant_chat::error::ChatError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ParticipantError>;
