use std::sync::Arc;
use std::time::Duration;

use lookervault_client::HttpLookerClient;
use lookervault_config::Config;
use lookervault_ratelimit::{AdaptiveRateLimiter, RateLimiter, RateLimiterConfig};
use lookervault_store::{SqliteStore, Store};

use crate::error::CliError;

/// The shared handles every subcommand needs: the local content store and,
/// where the command talks to Looker, an HTTP client wired to the
/// configured rate limits.
pub struct Context {
    pub config: Config,
    pub store: Arc<dyn Store>,
}

impl Context {
    pub fn open(config: Config) -> Result<Self, CliError> {
        let store = SqliteStore::open(&config.extraction.db_path)?;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Builds a client against the source/destination instance named by
    /// `base_url`, using the given worker pool's rate limit settings.
    pub fn client_for(
        &self,
        base_url: &str,
        rate_limit_per_minute: u32,
        rate_limit_per_second: u32,
    ) -> Result<Arc<dyn lookervault_client::LookerClient>, CliError> {
        if base_url.is_empty() {
            return Err(CliError::Connection(
                "no Looker base URL configured (set [looker].base_url, LOOKER_BASE_URL, or --db)"
                    .to_string(),
            ));
        }
        let rate_limiter: Arc<dyn RateLimiter> = Arc::new(AdaptiveRateLimiter::new(RateLimiterConfig {
            nominal_per_minute: rate_limit_per_minute,
            nominal_per_second: rate_limit_per_second,
        }));
        let client = HttpLookerClient::new(
            base_url.to_string(),
            Duration::from_secs(self.config.looker.timeout),
            rate_limiter,
        )
        .map_err(|e| CliError::Connection(e.to_string()))?;
        Ok(Arc::new(client))
    }
}
