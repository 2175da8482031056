use thiserror::Error;

/// Maps onto the exit codes from the CLI surface: `0` success, `1`
/// general/partial failure, `2` configuration error, `3` connection/auth
/// error, `4` API error (exhausted retries), `130` user cancelled.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] lookervault_config::ConfigError),
    #[error("{0}")]
    Connection(String),
    #[error("store error: {0}")]
    Store(#[from] lookervault_store::StoreError),
    #[error("{0}")]
    Api(String),
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) => 2,
            CliError::Connection(_) => 3,
            CliError::Api(_) => 4,
            CliError::Cancelled => 130,
            CliError::Store(_) | CliError::Other(_) => 1,
        }
    }
}

impl From<lookervault_core::ExtractionError> for CliError {
    fn from(err: lookervault_core::ExtractionError) -> Self {
        match err {
            lookervault_core::ExtractionError::Store(e) => CliError::Store(e),
            lookervault_core::ExtractionError::Cancelled => CliError::Cancelled,
            other => CliError::Other(anyhow::anyhow!(other)),
        }
    }
}

impl From<lookervault_core::RestorationError> for CliError {
    fn from(err: lookervault_core::RestorationError) -> Self {
        match err {
            lookervault_core::RestorationError::Store(e) => CliError::Store(e),
            other => CliError::Other(anyhow::anyhow!(other)),
        }
    }
}

impl From<lookervault_snapshot::SnapshotError> for CliError {
    fn from(err: lookervault_snapshot::SnapshotError) -> Self {
        CliError::Other(anyhow::anyhow!(err))
    }
}

impl From<lookervault_client::ClientError> for CliError {
    fn from(err: lookervault_client::ClientError) -> Self {
        use lookervault_client::ClientError;
        match err {
            ClientError::Cancelled => CliError::Cancelled,
            ClientError::Network(_) | ClientError::Timeout => CliError::Connection(err.to_string()),
            ClientError::Api { .. } | ClientError::RateLimited | ClientError::Malformed(_) => {
                CliError::Api(err.to_string())
            }
        }
    }
}
