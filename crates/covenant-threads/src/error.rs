use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadsError {
    #[error("store error: {0}")]
    Store(#[from] covenant_store::error::StoreError),
}

pub type Result<T> = std::result::Result<T, ThreadsError>;
