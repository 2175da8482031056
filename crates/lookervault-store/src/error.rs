use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("content item {0} not found")]
    NotFound(String),

    #[error("store is busy, writer lock held by another connection")]
    Busy,

    #[error("store is corrupt: {0}")]
    Corrupt(String),

    #[error("invalid content id: {0}")]
    InvalidId(String),
}
