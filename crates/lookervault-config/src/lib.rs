//! Layered configuration: built-in defaults, a TOML config file, environment
//! variables, and CLI flags, applied in that order of increasing precedence.

mod error;
mod load;
mod model;

pub use error::ConfigError;
pub use load::CliOverrides;
pub use model::{
    Config, ExtractionSettings, Filters, LookerSettings, ParallelSettings, RawFilters,
    RestoreSettings, StorageSettings,
};
