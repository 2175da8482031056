use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::Config;

const ENV_CONFIG_PATH: &str = "LOOKERVAULT_CONFIG";

impl Config {
    /// Loads the layered configuration: built-in defaults, overridden by the
    /// config file (explicit path, or `LOOKERVAULT_CONFIG`, or none), then
    /// overridden by the `LOOKER_*`/`LOOKERVAULT_*` environment variables.
    /// CLI flags are applied afterward by the caller via
    /// [`Config::apply_cli`] to preserve the documented CLI > env > file >
    /// default precedence.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| env::var_os(ENV_CONFIG_PATH).map(PathBuf::from));

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Config::default(),
        };

        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("LOOKER_BASE_URL") {
            self.looker.base_url = v;
        }
        if let Ok(v) = env::var("LOOKER_CLIENT_ID") {
            self.looker.client_id = v;
        }
        if let Ok(v) = env::var("LOOKER_CLIENT_SECRET") {
            self.looker.client_secret = v;
        }
        if let Ok(v) = env::var("LOOKER_TIMEOUT") {
            if let Ok(secs) = v.parse() {
                self.looker.timeout = secs;
            }
        }
        if let Ok(v) = env::var("LOOKERVAULT_DB_PATH") {
            self.extraction.db_path = PathBuf::from(v);
        }
    }

    /// Applies CLI-flag overrides, the highest-precedence layer. `None`
    /// fields leave the env/file/default value in place.
    pub fn apply_cli(&mut self, overrides: &CliOverrides) {
        if let Some(workers) = overrides.workers {
            self.parallel.workers = workers;
            self.restore.workers = workers;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.extraction.batch_size = batch_size;
        }
        if let Some(db_path) = &overrides.db_path {
            self.extraction.db_path = db_path.clone();
        }
        if let Some(rpm) = overrides.rate_limit_per_minute {
            self.parallel.rate_limit_per_minute = rpm;
            self.restore.rate_limit_per_minute = rpm;
        }
        if let Some(rps) = overrides.rate_limit_per_second {
            self.parallel.rate_limit_per_second = rps;
            self.restore.rate_limit_per_second = rps;
        }
        if let Some(interval) = overrides.checkpoint_interval {
            self.restore.checkpoint_interval = interval;
        }
        if let Some(max_retries) = overrides.max_retries {
            self.restore.max_retries = max_retries;
        }
    }
}

/// CLI-flag values that, when present, take precedence over everything
/// else. Populated by `lookervault-cli` from parsed `clap` arguments.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workers: Option<usize>,
    pub batch_size: Option<i64>,
    pub db_path: Option<PathBuf>,
    pub rate_limit_per_minute: Option<u32>,
    pub rate_limit_per_second: Option<u32>,
    pub checkpoint_interval: Option<u64>,
    pub max_retries: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_no_file_or_env_present() {
        let config = Config::default();
        assert_eq!(config.extraction.batch_size, 100);
        assert_eq!(config.restore.checkpoint_interval, 100);
        assert_eq!(config.parallel.rate_limit_per_minute, 100);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [looker]
            base_url = "https://example.looker.com"

            [extraction]
            batch_size = 250

            [restore]
            checkpoint_interval = 50
            "#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.looker.base_url, "https://example.looker.com");
        assert_eq!(config.extraction.batch_size, 250);
        assert_eq!(config.restore.checkpoint_interval, 50);
    }

    #[test]
    fn cli_overrides_win_over_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[extraction]\nbatch_size = 250\n").unwrap();

        let mut config = Config::load(Some(file.path())).unwrap();
        config.apply_cli(&CliOverrides {
            batch_size: Some(10),
            ..Default::default()
        });
        assert_eq!(config.extraction.batch_size, 10);
    }

    #[test]
    fn missing_file_path_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/lookervault.toml"))).unwrap();
        assert_eq!(config.extraction.batch_size, 100);
    }
}
