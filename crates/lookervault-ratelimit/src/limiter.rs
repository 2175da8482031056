use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Cancelled;
use crate::token::CancellationToken;

/// How long we're willing to sleep between cancellation checks while
/// waiting for a slot to free up. Keeping this short bounds the time a
/// `cancel()` takes to be observed.
const PARK_SLICE: Duration = Duration::from_millis(250);

/// On a 429, the backoff multiplier `M` grows by this factor.
const BACKOFF_FACTOR: f64 = 1.5;

/// Every `RECOVERY_SUCCESS_THRESHOLD`th consecutive success, `M` decays
/// toward 1.0 by `RECOVERY_FACTOR`, letting throughput recover once the API
/// has settled down.
const RECOVERY_SUCCESS_THRESHOLD: u64 = 10;
const RECOVERY_FACTOR: f64 = 0.9;

pub trait RateLimiter: Send + Sync {
    fn acquire(&self, cx: &CancellationToken) -> Result<(), Cancelled>;
    fn on_429(&self);
    fn on_success(&self);
    fn snapshot(&self) -> RateLimiterSnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterSnapshot {
    pub multiplier: f64,
    pub total_429: u64,
    pub consecutive_successes: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub nominal_per_minute: u32,
    pub nominal_per_second: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            nominal_per_minute: 100,
            nominal_per_second: 10,
        }
    }
}

struct State {
    minute_window: VecDeque<Instant>,
    second_window: VecDeque<Instant>,
    multiplier: f64,
    total_429: u64,
    consecutive_successes: u64,
}

/// A dual sliding-window token bucket whose effective capacity shrinks under
/// a backoff multiplier `M` when the API starts returning 429s, and grows
/// back toward nominal as calls keep succeeding.
pub struct AdaptiveRateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                minute_window: VecDeque::new(),
                second_window: VecDeque::new(),
                multiplier: 1.0,
                total_429: 0,
                consecutive_successes: 0,
            }),
        }
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant, horizon: Duration) {
        while let Some(&front) = window.front() {
            if now.duration_since(front) >= horizon {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns `Some(duration)` to wait if a slot isn't free yet, `None` if
    /// the caller may proceed (in which case `now` has already been
    /// recorded in both windows).
    fn try_acquire_once(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut state = self.state.lock();
        Self::prune(&mut state.minute_window, now, Duration::from_secs(60));
        Self::prune(&mut state.second_window, now, Duration::from_secs(1));

        let multiplier = state.multiplier;
        let minute_capacity =
            ((self.config.nominal_per_minute as f64) / multiplier).floor().max(1.0) as usize;
        let second_capacity =
            ((self.config.nominal_per_second as f64) / multiplier).floor().max(1.0) as usize;

        let minute_room = state.minute_window.len() < minute_capacity;
        let second_room = state.second_window.len() < second_capacity;

        if minute_room && second_room {
            state.minute_window.push_back(now);
            state.second_window.push_back(now);
            return None;
        }

        let wait_for = |window: &VecDeque<Instant>, horizon: Duration| -> Duration {
            window
                .front()
                .map(|&front| horizon.saturating_sub(now.duration_since(front)))
                .unwrap_or(PARK_SLICE)
        };
        let minute_wait = if minute_room {
            Duration::ZERO
        } else {
            wait_for(&state.minute_window, Duration::from_secs(60))
        };
        let second_wait = if second_room {
            Duration::ZERO
        } else {
            wait_for(&state.second_window, Duration::from_secs(1))
        };
        Some(minute_wait.max(second_wait).max(Duration::from_millis(1)))
    }
}

impl RateLimiter for AdaptiveRateLimiter {
    fn acquire(&self, cx: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            match self.try_acquire_once() {
                None => return Ok(()),
                Some(wait) => {
                    let mut remaining = wait;
                    while !remaining.is_zero() {
                        if cx.is_cancelled() {
                            return Err(Cancelled);
                        }
                        let slice = remaining.min(PARK_SLICE);
                        std::thread::park_timeout(slice);
                        remaining = remaining.saturating_sub(slice);
                    }
                    if cx.is_cancelled() {
                        return Err(Cancelled);
                    }
                }
            }
        }
    }

    fn on_429(&self) {
        let mut state = self.state.lock();
        state.multiplier *= BACKOFF_FACTOR;
        state.total_429 += 1;
        state.consecutive_successes = 0;
        tracing::warn!(multiplier = state.multiplier, "rate limiter backing off after 429");
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_successes += 1;
        if state.consecutive_successes >= RECOVERY_SUCCESS_THRESHOLD && state.multiplier > 1.0 {
            state.multiplier = (state.multiplier * RECOVERY_FACTOR).max(1.0);
            state.consecutive_successes = 0;
            tracing::debug!(multiplier = state.multiplier, "rate limiter recovering");
        }
    }

    fn snapshot(&self) -> RateLimiterSnapshot {
        let state = self.state.lock();
        RateLimiterSnapshot {
            multiplier: state.multiplier,
            total_429: state.total_429,
            consecutive_successes: state.consecutive_successes,
        }
    }
}
