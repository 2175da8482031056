use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize value: {0}")]
    SerializationError(String),

    #[error("failed to deserialize blob: {0}")]
    DeserializationError(String),
}
