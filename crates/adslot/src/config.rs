//! Timing configuration for new slots.

use serde::{Deserialize, Serialize};

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_REFRESH_WINDOW_MS: u64 = 300_000;
pub const DEFAULT_TIME_GAP_MS: u64 = 25_000;

const ENV_REFRESH_INTERVAL: &str = "ADSLOT_REFRESH_INTERVAL_MS";
const ENV_MAX_REFRESH_WINDOW: &str = "ADSLOT_MAX_REFRESH_WINDOW_MS";
const ENV_TIME_GAP: &str = "ADSLOT_TIME_GAP_MS";

/// Initial timing values stamped onto every slot a registry creates.
///
/// Individual slots can be retuned afterwards through their setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    /// Inline: delay between automatic refreshes (and failure retries).
    pub refresh_interval_ms: u64,
    /// Inline: total visible time after which automatic refresh stops.
    pub max_refresh_window_ms: u64,
    /// Overlay: minimum time between a dismissal and the next show.
    pub time_gap_ms: u64,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

impl SlotConfig {
    /// Built-in defaults, ignoring the environment.
    pub fn builtin() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            max_refresh_window_ms: DEFAULT_MAX_REFRESH_WINDOW_MS,
            time_gap_ms: DEFAULT_TIME_GAP_MS,
        }
    }

    /// Build from `ADSLOT_*` variables provided by `lookup`, falling back to the
    /// built-in defaults for anything missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            refresh_interval_ms: read_ms(
                &lookup,
                ENV_REFRESH_INTERVAL,
                1,
                DEFAULT_REFRESH_INTERVAL_MS,
            ),
            max_refresh_window_ms: read_ms(
                &lookup,
                ENV_MAX_REFRESH_WINDOW,
                1,
                DEFAULT_MAX_REFRESH_WINDOW_MS,
            ),
            time_gap_ms: read_ms(&lookup, ENV_TIME_GAP, 0, DEFAULT_TIME_GAP_MS),
        }
    }

    pub fn with_refresh_interval_ms(mut self, ms: u64) -> Self {
        self.refresh_interval_ms = ms;
        self
    }

    pub fn with_max_refresh_window_ms(mut self, ms: u64) -> Self {
        self.max_refresh_window_ms = ms;
        self
    }

    pub fn with_time_gap_ms(mut self, ms: u64) -> Self {
        self.time_gap_ms = ms;
        self
    }
}

fn read_ms<F>(lookup: &F, name: &str, min: u64, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms >= min => ms,
        _ => {
            tracing::warn!(
                var = name,
                value = %raw,
                default,
                "Invalid timing value, using default"
            );
            default
        }
    }
}
