//! Per-account quota tracking and cooperative throttling.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

/// Remaining-quota level at or below which the limiter arms its cooldown.
pub const LOW_WATER_MARK: u32 = 10;

/// Default quota ceiling when the configuration does not set one.
const DEFAULT_MAX_WEIGHT: u32 = 6000;

/// Quota state for one (exchange, account) pairing.
///
/// Mutated only through [`RateLimiter::observe`] after a response; read
/// before every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    /// Quota units consumed in the current window.
    pub used_weight: u32,
    /// Quota ceiling for one window.
    pub max_weight: u32,
    /// Absolute time after which the quota refills, when a cooldown is armed.
    pub reset_time: Option<DateTime<Utc>>,
}

/// Quota metadata extracted from one response.
///
/// Header names are venue-specific and belong to the exchange adapter; by
/// the time an update reaches the limiter it is purely numeric. Venues
/// report either consumed weight (Binance style) or remaining headroom with
/// a reset hint (OKX style).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitUpdate {
    /// Consumed-weight reading, when the venue reports usage.
    pub used_weight: Option<u32>,
    /// Remaining-request reading, when the venue reports headroom.
    pub remaining: Option<u32>,
    /// Seconds until the quota window resets, when reported.
    pub reset_after_secs: Option<u64>,
}

impl RateLimitUpdate {
    /// Returns true if the update carries no quota metadata at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used_weight.is_none() && self.remaining.is_none() && self.reset_after_secs.is_none()
    }
}

/// Tracks one account's request quota and suspends the calling path while a
/// cooldown is pending.
///
/// The limiter never retries requests itself; it only gates when the next
/// request may be sent. One instance exists per (exchange, account) pairing
/// and lives for the duration of a fetch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiter {
    state: RateLimitState,
}

impl RateLimiter {
    /// Creates a limiter with the given per-window weight ceiling.
    #[must_use]
    pub const fn new(max_weight: u32) -> Self {
        Self {
            state: RateLimitState {
                used_weight: 0,
                max_weight,
                reset_time: None,
            },
        }
    }

    /// Current quota state.
    #[must_use]
    pub const fn state(&self) -> &RateLimitState {
        &self.state
    }

    /// Returns true if a cooldown deadline is armed and still in the future.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.state.reset_time.is_some_and(|t| t > Utc::now())
    }

    /// Folds one response's quota metadata into the state.
    ///
    /// A cooldown is armed when the effective remaining quota (reported
    /// directly, or derived as `max_weight - used_weight`) is at or below
    /// [`LOW_WATER_MARK`] and the update carries a reset hint. Updates
    /// without a reset hint only record consumption.
    pub fn observe(&mut self, update: RateLimitUpdate) {
        if let Some(used) = update.used_weight {
            self.state.used_weight = used;
        }

        let remaining = update.remaining.or_else(|| {
            update
                .used_weight
                .map(|used| self.state.max_weight.saturating_sub(used))
        });

        if let (Some(remaining), Some(secs)) = (remaining, update.reset_after_secs)
            && remaining <= LOW_WATER_MARK
        {
            let reset_in = TimeDelta::seconds(i64::try_from(secs).unwrap_or(i64::MAX));
            self.state.reset_time = Some(Utc::now() + reset_in);
            debug!(remaining, reset_in_secs = secs, "quota low, cooldown armed");
        }
    }

    /// Suspends until the armed cooldown deadline has passed, then clears it.
    ///
    /// A no-op when no cooldown is armed or the deadline already passed. The
    /// wait is a cancellable sleep, never a busy spin.
    pub async fn await_ready(&mut self) {
        let Some(reset_time) = self.state.reset_time else {
            return;
        };
        let wait = reset_time.signed_duration_since(Utc::now());
        if wait > TimeDelta::zero() {
            let wait = wait.to_std().unwrap_or_default();
            let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
            debug!(wait_ms, "throttled, waiting for quota reset");
            tokio::time::sleep(wait).await;
        }
        // Cleared only once the deadline has passed, so a cancelled wait
        // leaves the limiter throttled.
        self.state.reset_time = None;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WEIGHT)
    }
}
