//! Overlay slots: full-screen creatives gated by a minimum time between shows.

use crate::config::SlotConfig;
use crate::controller::{AdSlotController, HideAction, PolicySnapshot, Presentation, TimerPlan};
use crate::error::{ShowDecline, SlotError};
use crate::format::PresentationStyle;
use crate::state::LoadOrigin;

/// Frequency cap for one overlay slot.
///
/// A show is admitted only when at least `time_gap_ms` has passed since the last
/// dismissal. Before the first dismissal every show is admitted.
#[derive(Debug, Clone)]
pub struct OverlayFrequencyGate {
    time_gap_ms: u64,
    last_dismissed_at_ms: Option<u64>,
}

impl OverlayFrequencyGate {
    pub fn new(time_gap_ms: u64) -> Self {
        Self {
            time_gap_ms,
            last_dismissed_at_ms: None,
        }
    }
}

impl Presentation for OverlayFrequencyGate {
    const STYLE: PresentationStyle = PresentationStyle::Overlay;

    fn from_config(config: &SlotConfig) -> Self {
        Self::new(config.time_gap_ms)
    }

    fn admission(&self, now_ms: u64) -> Result<(), ShowDecline> {
        let Some(last) = self.last_dismissed_at_ms else {
            return Ok(());
        };
        let elapsed_ms = now_ms.saturating_sub(last);
        if elapsed_ms >= self.time_gap_ms {
            Ok(())
        } else {
            tracing::warn!(elapsed_ms, required_ms = self.time_gap_ms, "time gap not satisfied");
            Err(ShowDecline::TimeGap {
                elapsed_ms,
                required_ms: self.time_gap_ms,
            })
        }
    }

    fn on_hide(&self) -> HideAction {
        HideAction::Ignore
    }

    fn shows_on_load(&self) -> bool {
        false
    }

    fn on_loaded(&mut self, _now_ms: u64, _origin: LoadOrigin) -> TimerPlan {
        TimerPlan::Keep
    }

    fn on_load_failed(&mut self, _now_ms: u64) -> TimerPlan {
        TimerPlan::Keep
    }

    fn on_dismissed(&mut self, now_ms: u64) {
        self.last_dismissed_at_ms = Some(now_ms);
    }

    fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot::Overlay {
            time_gap_ms: self.time_gap_ms,
            last_dismissed_at_ms: self.last_dismissed_at_ms,
        }
    }
}

impl AdSlotController<OverlayFrequencyGate> {
    /// Set the minimum gap between a dismissal and the next show. Zero disables the cap.
    pub fn set_time_gap(&self, ms: i64) -> Result<(), SlotError> {
        let Ok(ms) = u64::try_from(ms) else {
            let err = SlotError::InvalidTiming {
                name: "time gap",
                requirement: "0 or greater",
                value: ms,
            };
            tracing::warn!(slot = %self.key(), reason = %err, "Time gap rejected");
            return Err(err);
        };
        self.lock().policy.time_gap_ms = ms;
        tracing::debug!(slot = %self.key(), time_gap_ms = ms, "Time gap set");
        Ok(())
    }

    pub fn time_gap_ms(&self) -> u64 {
        self.lock().policy.time_gap_ms
    }

    pub fn last_dismissed_at_ms(&self) -> Option<u64> {
        self.lock().policy.last_dismissed_at_ms
    }
}
