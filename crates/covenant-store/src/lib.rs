pub mod error;
pub mod fs;
pub mod manager;
pub mod types;

pub use error::{Result, StoreError};
pub use manager::{FileTreeStore, Store};
