//! Adaptive inter-request delays: jittered base pacing, capped exponential
//! backoff on failing channels, and per-channel request spacing.

use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::Config;

pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    pub fn delay(&self, failures: u32) -> Duration {
        let exponential = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(failures.min(20)));
        Duration::from_millis(exponential.min(self.max_ms))
    }
}

/// Computes the delay owed before each outbound request and remembers when the
/// last request on each channel went out. One instance per process; the
/// resolver and batch driver share it.
pub struct Pacer {
    backoff: ExponentialBackoff,
    min_delay: Duration,
    max_delay: Duration,
    direct_delay: Duration,
    block_cooldown: Duration,
    search_jitter: Duration,
    direct_jitter: Duration,
    last_request: HashMap<String, Instant>,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer {
    pub fn new() -> Self {
        Self {
            backoff: ExponentialBackoff::new(
                Config::MIN_DELAY_SECS * 1000,
                Config::MAX_BACKOFF_SECS * 1000,
            ),
            min_delay: Duration::from_secs(Config::MIN_DELAY_SECS),
            max_delay: Duration::from_secs(Config::MAX_DELAY_SECS),
            direct_delay: Duration::from_secs(Config::DIRECT_SEARCH_DELAY_SECS),
            block_cooldown: Duration::from_secs(Config::BLOCK_COOLDOWN_SECS),
            search_jitter: Duration::from_secs(Config::SEARCH_JITTER_SECS),
            direct_jitter: Duration::from_secs(Config::DIRECT_JITTER_SECS),
            last_request: HashMap::new(),
        }
    }

    /// Test constructor: explicit timings, no jitter.
    pub fn with_timing(
        min_delay: Duration,
        max_delay: Duration,
        direct_delay: Duration,
        block_cooldown: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            backoff: ExponentialBackoff::new(min_delay.as_millis() as u64, max_backoff.as_millis() as u64),
            min_delay,
            max_delay,
            direct_delay,
            block_cooldown,
            search_jitter: Duration::ZERO,
            direct_jitter: Duration::ZERO,
            last_request: HashMap::new(),
        }
    }

    /// The delay owed before the next request on `channel`.
    ///
    /// Blocked cooldown trumps everything; the direct Argos channel gets a
    /// short fixed base; a failing channel gets capped exponential backoff;
    /// otherwise a uniformly random base. Jitter is added in every branch so
    /// the cadence never settles into a fixed pattern. Time already elapsed
    /// since the last request on the same channel is subtracted, but only when
    /// it is shorter than the computed delay.
    pub fn delay_before(
        &self,
        channel: Option<&str>,
        failures: u32,
        blocked_cooldown: bool,
        direct: bool,
    ) -> Duration {
        let mut delay = if blocked_cooldown {
            self.block_cooldown
        } else if direct {
            self.direct_delay
        } else if failures > 0 {
            self.backoff.delay(failures)
        } else {
            uniform_between(self.min_delay, self.max_delay)
        };

        let jitter = if direct {
            self.direct_jitter
        } else {
            self.search_jitter
        };
        delay += uniform_between(Duration::ZERO, jitter);

        if let Some(name) = channel {
            if let Some(last) = self.last_request.get(name) {
                let elapsed = last.elapsed();
                if elapsed < delay {
                    delay -= elapsed;
                }
            }
        }

        delay
    }

    /// Sleep out the owed delay, then stamp `channel`'s last-request time.
    pub async fn wait(
        &mut self,
        channel: Option<&str>,
        failures: u32,
        blocked_cooldown: bool,
        direct: bool,
    ) {
        let delay = self.delay_before(channel, failures, blocked_cooldown, direct);
        tracing::debug!(
            channel = channel.unwrap_or("-"),
            delay_secs = delay.as_secs_f64(),
            "waiting before next request"
        );
        tokio::time::sleep(delay).await;
        if let Some(name) = channel {
            self.note_request(name);
        }
    }

    /// Stamp a channel's last-request time without sleeping.
    pub fn note_request(&mut self, channel: &str) {
        self.last_request.insert(channel.to_string(), Instant::now());
    }

    #[cfg(test)]
    fn note_request_at(&mut self, channel: &str, at: Instant) {
        self.last_request.insert(channel.to_string(), at);
    }
}

fn uniform_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pacer() -> Pacer {
        Pacer::with_timing(
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(3),
            Duration::from_secs(1800),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_backoff_growth() {
        let backoff = ExponentialBackoff::new(100, 10_000);
        assert_eq!(backoff.delay(1).as_millis(), 200);
        assert_eq!(backoff.delay(2).as_millis(), 400);
        assert_eq!(backoff.delay(3).as_millis(), 800);
    }

    #[test]
    fn test_backoff_cap() {
        let backoff = ExponentialBackoff::new(100, 1000);
        assert!(backoff.delay(10).as_millis() <= 1000);
        assert!(backoff.delay(60).as_millis() <= 1000);
    }

    #[test]
    fn test_backoff_non_decreasing() {
        let backoff = ExponentialBackoff::new(5000, 300_000);
        let mut previous = Duration::ZERO;
        for failures in 0..16 {
            let delay = backoff.delay(failures);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(300));
            previous = delay;
        }
    }

    #[test]
    fn test_blocked_cooldown_trumps_everything() {
        let pacer = test_pacer();
        let delay = pacer.delay_before(None, 7, true, true);
        assert_eq!(delay, Duration::from_secs(1800));
    }

    #[test]
    fn test_direct_channel_short_delay() {
        let pacer = test_pacer();
        assert_eq!(
            pacer.delay_before(Some("argos"), 0, false, true),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_failing_channel_gets_backoff() {
        let pacer = test_pacer();
        let delay = pacer.delay_before(Some("google"), 2, false, false);
        assert_eq!(delay, Duration::from_secs(20)); // 5s * 2^2
    }

    #[test]
    fn test_healthy_channel_in_configured_range() {
        let pacer = test_pacer();
        for _ in 0..20 {
            let delay = pacer.delay_before(Some("yahoo"), 0, false, false);
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_elapsed_time_on_same_channel_is_credited() {
        let mut pacer = test_pacer();
        let Some(two_secs_ago) = Instant::now().checked_sub(Duration::from_secs(2)) else {
            return;
        };
        pacer.note_request_at("argos", two_secs_ago);

        let delay = pacer.delay_before(Some("argos"), 0, false, true);
        // 3s base minus ~2s already elapsed.
        assert!(delay <= Duration::from_secs(1));
        assert!(delay >= Duration::from_millis(900));
    }

    #[test]
    fn test_other_channels_not_credited() {
        let mut pacer = test_pacer();
        let Some(earlier) = Instant::now().checked_sub(Duration::from_secs(2)) else {
            return;
        };
        pacer.note_request_at("google", earlier);

        let delay = pacer.delay_before(Some("argos"), 0, false, true);
        assert_eq!(delay, Duration::from_secs(3));
    }

    #[test]
    fn test_long_idle_channel_still_waits_full_delay() {
        let mut pacer = test_pacer();
        let Some(long_ago) = Instant::now().checked_sub(Duration::from_secs(3600)) else {
            return;
        };
        pacer.note_request_at("argos", long_ago);

        // Elapsed exceeds the computed delay, so nothing is subtracted.
        let delay = pacer.delay_before(Some("argos"), 0, false, true);
        assert_eq!(delay, Duration::from_secs(3));
    }
}
