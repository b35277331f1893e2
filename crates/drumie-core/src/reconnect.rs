//! Reconnect backoff policy.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff applied between connect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Whether to reconnect at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Attempts allowed before giving up; `None` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Random spread applied to each delay, as a fraction of it (0.0 - 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> Option<u32> {
    Some(10)
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    20_000 // 20 seconds
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Returns `None` once the policy is disabled or exhausted.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        let cap = self.max_delay_ms as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent)).min(cap);

        let delay = if self.jitter > 0.0 {
            let spread = base * self.jitter.min(1.0);
            base + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            base
        };

        Some(Duration::from_millis(delay.clamp(0.0, cap) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(initial: u64, max: u64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay_ms: initial,
            max_delay_ms: max,
            jitter: 0.0,
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn test_delays_grow_geometrically_and_cap() {
        let policy = exact(100, 1_000);
        let delays: Vec<u64> = (0..6)
            .map(|n| policy.delay(n).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn test_exhaustion() {
        let policy = ReconnectPolicy {
            max_attempts: Some(2),
            ..exact(10, 100)
        };
        assert!(policy.delay(0).is_some());
        assert!(policy.delay(1).is_some());
        assert!(policy.delay(2).is_none());

        let forever = ReconnectPolicy {
            max_attempts: None,
            ..exact(10, 100)
        };
        assert_eq!(forever.delay(10_000), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_disabled() {
        assert!(ReconnectPolicy::disabled().delay(0).is_none());
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = ReconnectPolicy {
            jitter: 0.5,
            ..exact(1_000, 10_000)
        };
        for _ in 0..100 {
            let ms = policy.delay(0).unwrap().as_millis();
            assert!((500..=1_500).contains(&ms), "delay {} out of bounds", ms);
        }
    }
}
