//! Per-channel block and cooldown bookkeeping for the search rotation.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::Config;

/// The fixed set of external search providers used for code lookups.
/// Model lookups bypass the rotation entirely and query Argos directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchChannel {
    Google,
    MullvadGoogle,
    Yahoo,
    Yandex,
}

impl SearchChannel {
    pub const ALL: [SearchChannel; 4] = [
        SearchChannel::Google,
        SearchChannel::MullvadGoogle,
        SearchChannel::Yahoo,
        SearchChannel::Yandex,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SearchChannel::Google => "google",
            SearchChannel::MullvadGoogle => "mullvad_google",
            SearchChannel::Yahoo => "yahoo",
            SearchChannel::Yandex => "yandex",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

/// Block state for one channel.
///
/// `last_blocked_at` is only ever written by a rate-limit event; cooldown
/// expiry clears `blocked` but leaves the timestamp for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub blocked: bool,
    pub last_blocked_at: Option<u64>, // UNIX seconds
    pub consecutive_failures: u32,
}

/// Persisted form of one channel's state. Failure counts are per-process and
/// deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedChannel {
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_time: Option<u64>,
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Tracks blocked/available state for every configured channel.
pub struct ChannelHealth {
    states: HashMap<SearchChannel, ChannelState>,
    cooldown: Duration,
}

impl Default for ChannelHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHealth {
    pub fn new() -> Self {
        Self::with_cooldown(Duration::from_secs(Config::BLOCK_COOLDOWN_SECS))
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        let states = SearchChannel::ALL
            .iter()
            .map(|&c| (c, ChannelState::default()))
            .collect();
        Self { states, cooldown }
    }

    pub fn state(&self, channel: SearchChannel) -> &ChannelState {
        &self.states[&channel]
    }

    pub fn failures(&self, channel: SearchChannel) -> u32 {
        self.states[&channel].consecutive_failures
    }

    pub fn record_failure(&mut self, channel: SearchChannel) {
        self.record_failure_at(channel, now_secs());
    }

    pub fn record_failure_at(&mut self, channel: SearchChannel, now: u64) {
        let state = self.states.entry(channel).or_default();
        state.blocked = true;
        state.last_blocked_at = Some(now);
        state.consecutive_failures += 1;
    }

    /// Success resets the failure count only. A block is cleared by cooldown
    /// expiry, never by a success on the same channel.
    pub fn record_success(&mut self, channel: SearchChannel) {
        self.states.entry(channel).or_default().consecutive_failures = 0;
    }

    /// Channels currently usable, in randomized order. A blocked channel whose
    /// cooldown has elapsed is unblocked here as a side effect.
    pub fn available_channels(&mut self) -> Vec<SearchChannel> {
        let mut available = self.available_channels_at(now_secs());
        available.shuffle(&mut rand::thread_rng());
        available
    }

    pub fn available_channels_at(&mut self, now: u64) -> Vec<SearchChannel> {
        let cooldown_secs = self.cooldown.as_secs();
        let mut available = Vec::new();
        for channel in SearchChannel::ALL {
            let state = self.states.entry(channel).or_default();
            if !state.blocked {
                available.push(channel);
                continue;
            }
            match state.last_blocked_at {
                Some(blocked_at) if now.saturating_sub(blocked_at) >= cooldown_secs => {
                    state.blocked = false;
                    tracing::info!(channel = channel.name(), "cooldown passed, unblocking");
                    available.push(channel);
                }
                _ => {}
            }
        }
        available
    }

    pub fn all_blocked(&self) -> bool {
        self.all_blocked_at(now_secs())
    }

    pub fn all_blocked_at(&self, now: u64) -> bool {
        SearchChannel::ALL.iter().all(|c| {
            let state = &self.states[c];
            state.blocked
                && match state.last_blocked_at {
                    Some(blocked_at) => now.saturating_sub(blocked_at) < self.cooldown.as_secs(),
                    None => true,
                }
        })
    }

    /// Remaining cooldown on one blocked channel with a recorded block time.
    pub fn remaining_cooldown(&self, channel: SearchChannel) -> Option<Duration> {
        self.remaining_cooldown_at(channel, now_secs())
    }

    pub fn remaining_cooldown_at(&self, channel: SearchChannel, now: u64) -> Option<Duration> {
        let state = &self.states[&channel];
        if !state.blocked {
            return None;
        }
        let blocked_at = state.last_blocked_at?;
        let remaining = self
            .cooldown
            .as_secs()
            .checked_sub(now.saturating_sub(blocked_at))?;
        (remaining > 0).then(|| Duration::from_secs(remaining))
    }

    /// Smallest remaining cooldown over blocked channels with a recorded block
    /// time. `None` when no channel is waiting out a block.
    pub fn min_remaining_cooldown(&self) -> Option<Duration> {
        self.min_remaining_cooldown_at(now_secs())
    }

    pub fn min_remaining_cooldown_at(&self, now: u64) -> Option<Duration> {
        SearchChannel::ALL
            .iter()
            .filter_map(|&c| self.remaining_cooldown_at(c, now))
            .min()
    }

    pub fn to_persisted(&self) -> HashMap<String, PersistedChannel> {
        self.states
            .iter()
            .map(|(channel, state)| {
                (
                    channel.name().to_string(),
                    PersistedChannel {
                        blocked: state.blocked,
                        last_block_time: state.last_blocked_at,
                    },
                )
            })
            .collect()
    }

    /// Rebuild from a persisted snapshot. Unknown channel names are ignored;
    /// a stale cooldown is not cleared here - expiry is recomputed from the
    /// stored timestamp on the next availability check.
    pub fn from_persisted(snapshot: &HashMap<String, PersistedChannel>) -> Self {
        let mut health = Self::new();
        for (name, persisted) in snapshot {
            if let Some(channel) = SearchChannel::from_name(name) {
                let state = health.states.entry(channel).or_default();
                state.blocked = persisted.blocked;
                state.last_blocked_at = persisted.last_block_time;
            }
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_blocks_and_counts() {
        let mut health = ChannelHealth::new();
        health.record_failure_at(SearchChannel::Google, 1000);
        let state = health.state(SearchChannel::Google);
        assert!(state.blocked);
        assert_eq!(state.last_blocked_at, Some(1000));
        assert_eq!(state.consecutive_failures, 1);

        health.record_failure_at(SearchChannel::Google, 1010);
        assert_eq!(health.failures(SearchChannel::Google), 2);
    }

    #[test]
    fn test_success_resets_failures_but_not_block() {
        let mut health = ChannelHealth::new();
        health.record_failure_at(SearchChannel::Yahoo, 1000);
        health.record_success(SearchChannel::Yahoo);
        let state = health.state(SearchChannel::Yahoo);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.blocked);
    }

    #[test]
    fn test_available_excludes_blocked_within_cooldown() {
        let mut health = ChannelHealth::with_cooldown(Duration::from_secs(1800));
        health.record_failure_at(SearchChannel::Google, 1000);

        let available = health.available_channels_at(1100);
        assert!(!available.contains(&SearchChannel::Google));
        assert_eq!(available.len(), 3);
    }

    #[test]
    fn test_cooldown_expiry_unblocks_as_side_effect() {
        let mut health = ChannelHealth::with_cooldown(Duration::from_secs(1800));
        health.record_failure_at(SearchChannel::Google, 1000);

        let available = health.available_channels_at(1000 + 1800);
        assert!(available.contains(&SearchChannel::Google));
        assert!(!health.state(SearchChannel::Google).blocked);
        // The block timestamp stays for reporting.
        assert_eq!(health.state(SearchChannel::Google).last_blocked_at, Some(1000));
    }

    #[test]
    fn test_all_blocked() {
        let mut health = ChannelHealth::with_cooldown(Duration::from_secs(1800));
        assert!(!health.all_blocked_at(1000));

        for channel in SearchChannel::ALL {
            health.record_failure_at(channel, 1000);
        }
        assert!(health.all_blocked_at(1100));
        // Once one cooldown expires the rotation has a usable channel again.
        assert!(!health.all_blocked_at(1000 + 1800));
    }

    #[test]
    fn test_min_remaining_cooldown() {
        let mut health = ChannelHealth::with_cooldown(Duration::from_secs(1800));
        assert_eq!(health.min_remaining_cooldown_at(1000), None);

        health.record_failure_at(SearchChannel::Google, 1000);
        health.record_failure_at(SearchChannel::Yandex, 1500);

        // Google was blocked first so it expires first.
        let remaining = health.min_remaining_cooldown_at(2000).unwrap();
        assert_eq!(remaining, Duration::from_secs(800));
    }

    #[test]
    fn test_three_rate_limits_leave_full_cooldown() {
        let mut health = ChannelHealth::with_cooldown(Duration::from_secs(1800));
        for _ in 0..3 {
            health.record_failure_at(SearchChannel::Yahoo, 5000);
        }
        assert_eq!(health.failures(SearchChannel::Yahoo), 3);
        assert_eq!(
            health.min_remaining_cooldown_at(5000),
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn test_persist_round_trip() {
        let mut health = ChannelHealth::new();
        health.record_failure_at(SearchChannel::MullvadGoogle, 4242);

        let snapshot = health.to_persisted();
        let restored = ChannelHealth::from_persisted(&snapshot);

        for channel in SearchChannel::ALL {
            assert_eq!(
                health.state(channel).blocked,
                restored.state(channel).blocked
            );
            assert_eq!(
                health.state(channel).last_blocked_at,
                restored.state(channel).last_blocked_at
            );
        }
        // Failure counts are process-local and never round-trip.
        assert_eq!(restored.failures(SearchChannel::MullvadGoogle), 0);
    }

    #[test]
    fn test_from_persisted_ignores_unknown_names() {
        let mut snapshot = HashMap::new();
        snapshot.insert(
            "altavista".to_string(),
            PersistedChannel {
                blocked: true,
                last_block_time: Some(1),
            },
        );
        let health = ChannelHealth::from_persisted(&snapshot);
        assert!(!health.all_blocked_at(10));
    }
}
