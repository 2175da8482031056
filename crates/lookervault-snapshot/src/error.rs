use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot {0:?} not found")]
    NotFound(String),
    #[error("malformed snapshot filename {0:?}")]
    Malformed(String),
    #[error("checksum mismatch for {reference}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        reference: String,
        expected: u32,
        actual: u32,
    },
}
