mod error;
mod limiter;
mod token;

pub use error::Cancelled;
pub use limiter::{AdaptiveRateLimiter, RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
pub use token::CancellationToken;
