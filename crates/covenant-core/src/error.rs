use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid contract id: {0}")]
    InvalidContractId(String),

    #[error("invalid tier: {0}")]
    InvalidTier(String),

    #[error("invalid lifecycle status: {0}")]
    InvalidStatus(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
