use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("rate limiter acquire cancelled")]
pub struct Cancelled;
