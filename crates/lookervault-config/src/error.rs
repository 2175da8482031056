use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid content type {0:?} in config filters")]
    InvalidContentType(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
