//! Inline slots: bounded auto-refresh driven by visibility.
//!
//! While a slot is visible, a successful load schedules a refresh after the
//! refresh interval. Each refresh charges the time since the last accounting
//! point against a cumulative budget; once the budget reaches the maximum
//! refresh window the slot stops refreshing on its own until a fresh `load()`
//! resets it. Pausing stops the clock without giving any budget back.

use std::time::Duration;

use crate::config::SlotConfig;
use crate::controller::{
    AdSlotController, HideAction, PolicySnapshot, Presentation, SlotCore, TimerAction, TimerPlan,
};
use crate::error::{ShowDecline, SlotError};
use crate::format::PresentationStyle;
use crate::state::{LoadOrigin, SlotState};

/// Host view-lifecycle events for an inline slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityEvent {
    /// The slot's container was attached to the screen.
    Attached,
    /// The container was detached; equivalent to `pause()`.
    Detached,
    /// The container became visible (`true`) or hidden (`false`).
    VisibilityChanged(bool),
}

/// Refresh budget and visibility of one inline slot.
#[derive(Debug, Clone)]
pub struct InlineRefreshScheduler {
    refresh_interval_ms: u64,
    max_refresh_window_ms: u64,
    cumulative_elapsed_ms: u64,
    last_timestamp_ms: Option<u64>,
    visible: bool,
}

impl InlineRefreshScheduler {
    pub fn new(refresh_interval_ms: u64, max_refresh_window_ms: u64) -> Self {
        Self {
            refresh_interval_ms,
            max_refresh_window_ms,
            cumulative_elapsed_ms: 0,
            last_timestamp_ms: None,
            visible: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cumulative_elapsed_ms >= self.max_refresh_window_ms
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    fn next_plan(&self) -> TimerPlan {
        if self.visible && !self.is_exhausted() {
            TimerPlan::Schedule(self.interval())
        } else {
            TimerPlan::Cancel
        }
    }

    /// Charge the time since the last accounting point and decide whether to reload.
    fn refresh(&mut self, now_ms: u64) -> TimerAction {
        let last = self.last_timestamp_ms.unwrap_or(now_ms);
        self.cumulative_elapsed_ms = self
            .cumulative_elapsed_ms
            .saturating_add(now_ms.saturating_sub(last));
        self.last_timestamp_ms = Some(now_ms);

        if self.is_exhausted() {
            TimerAction::Stop
        } else {
            TimerAction::Reload
        }
    }

    /// Returns whether the slot was hidden before. Only a hidden-to-visible
    /// transition restarts the accounting point.
    fn mark_visible(&mut self, now_ms: u64) -> bool {
        if self.visible {
            return false;
        }
        self.visible = true;
        self.last_timestamp_ms = Some(now_ms);
        true
    }
}

impl Presentation for InlineRefreshScheduler {
    const STYLE: PresentationStyle = PresentationStyle::Inline;

    fn from_config(config: &SlotConfig) -> Self {
        Self::new(config.refresh_interval_ms, config.max_refresh_window_ms)
    }

    fn admission(&self, _now_ms: u64) -> Result<(), ShowDecline> {
        if self.visible {
            Ok(())
        } else {
            Err(ShowDecline::NotVisible)
        }
    }

    fn on_hide(&self) -> HideAction {
        HideAction::Detach
    }

    fn shows_on_load(&self) -> bool {
        self.visible
    }

    fn on_loaded(&mut self, now_ms: u64, origin: LoadOrigin) -> TimerPlan {
        if origin == LoadOrigin::Fresh {
            self.cumulative_elapsed_ms = 0;
        }
        self.last_timestamp_ms = Some(now_ms);
        self.next_plan()
    }

    fn on_load_failed(&mut self, now_ms: u64) -> TimerPlan {
        self.last_timestamp_ms.get_or_insert(now_ms);
        self.next_plan()
    }

    fn on_timer(&mut self, now_ms: u64) -> TimerAction {
        if !self.visible {
            return TimerAction::Ignore;
        }
        self.refresh(now_ms)
    }

    fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot::Inline {
            visible: self.visible,
            refresh_interval_ms: self.refresh_interval_ms,
            max_refresh_window_ms: self.max_refresh_window_ms,
            cumulative_elapsed_ms: self.cumulative_elapsed_ms,
            exhausted: self.is_exhausted(),
        }
    }
}

fn positive_ms(name: &'static str, value: i64) -> Result<u64, SlotError> {
    match u64::try_from(value) {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(SlotError::InvalidTiming {
            name,
            requirement: "greater than 0",
            value,
        }),
    }
}

impl AdSlotController<InlineRefreshScheduler> {
    /// Host lifecycle pause: stop refreshing, keep the budget.
    pub fn pause(&self) {
        let mut core = self.lock();
        if core.state == SlotState::Destroyed {
            return;
        }
        core.policy.visible = false;
        self.cancel_timer_locked(&mut core);
        if let Some(handle) = core.handle.as_ref() {
            self.source().pause(handle);
        }
        tracing::debug!(
            slot = %self.key(),
            cumulative_ms = core.policy.cumulative_elapsed_ms,
            "Inline slot paused"
        );
    }

    /// Host lifecycle resume: show or load, then refresh again if budget remains.
    pub fn resume(&self) {
        let mut core = self.lock();
        if core.state == SlotState::Destroyed {
            return;
        }
        self.activate_locked(&mut core);
        if let Some(handle) = core.handle.as_ref() {
            self.source().resume(handle);
        }
    }

    pub fn on_visibility(&self, event: VisibilityEvent) {
        tracing::trace!(slot = %self.key(), ?event, "Visibility event");
        match event {
            VisibilityEvent::Detached => self.pause(),
            VisibilityEvent::Attached | VisibilityEvent::VisibilityChanged(true) => {
                let mut core = self.lock();
                if core.state != SlotState::Destroyed {
                    self.activate_locked(&mut core);
                }
            }
            VisibilityEvent::VisibilityChanged(false) => {
                let mut core = self.lock();
                core.policy.visible = false;
                self.cancel_timer_locked(&mut core);
            }
        }
    }

    fn activate_locked(&self, core: &mut SlotCore<InlineRefreshScheduler>) {
        let now = self.now_ms();
        let was_hidden = core.policy.mark_visible(now);
        if !core.should_show {
            return;
        }

        match core.state {
            SlotState::Ready => {
                let _ = self.show_locked(core, false);
            }
            SlotState::Showing | SlotState::Loading => {}
            _ => {
                if let Err(e) = self.start_load_locked(core, LoadOrigin::Fresh) {
                    tracing::debug!(slot = %self.key(), reason = %e, "Visible slot could not load");
                }
            }
        }

        let restart = was_hidden || core.timer.is_none();
        if restart && core.state.is_loaded() && !core.policy.is_exhausted() {
            let delay = core.policy.interval();
            self.schedule_timer_locked(core, delay);
        }
    }

    /// Change the refresh interval. A pending refresh or retry is rescheduled with
    /// the new interval; accumulated budget is kept.
    pub fn set_refresh_time(&self, ms: i64) -> Result<(), SlotError> {
        let ms = positive_ms("refresh interval", ms).inspect_err(|e| {
            tracing::warn!(slot = %self.key(), reason = %e, "Refresh interval rejected");
        })?;

        let mut core = self.lock();
        core.policy.refresh_interval_ms = ms;
        tracing::debug!(slot = %self.key(), refresh_interval_ms = ms, "Refresh interval set");

        if core.timer.is_some() && core.policy.visible && !core.policy.is_exhausted() {
            self.schedule_timer_locked(&mut core, Duration::from_millis(ms));
        }
        Ok(())
    }

    pub fn set_max_refresh_time(&self, ms: i64) -> Result<(), SlotError> {
        let ms = positive_ms("max refresh window", ms).inspect_err(|e| {
            tracing::warn!(slot = %self.key(), reason = %e, "Max refresh window rejected");
        })?;

        let mut core = self.lock();
        core.policy.max_refresh_window_ms = ms;
        tracing::debug!(slot = %self.key(), max_refresh_window_ms = ms, "Max refresh window set");
        Ok(())
    }

    /// Run the refresh step now: charge elapsed time, then reload or stop.
    pub fn refresh(&self) {
        let mut core = self.lock();
        if core.state == SlotState::Destroyed {
            return;
        }
        self.cancel_timer_locked(&mut core);
        let action = core.policy.refresh(self.now_ms());
        tracing::debug!(
            slot = %self.key(),
            cumulative_ms = core.policy.cumulative_elapsed_ms,
            max_ms = core.policy.max_refresh_window_ms,
            "Manual refresh"
        );
        self.run_timer_action_locked(&mut core, action);
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.lock().policy.refresh_interval_ms
    }

    pub fn max_refresh_window_ms(&self) -> u64 {
        self.lock().policy.max_refresh_window_ms
    }

    pub fn cumulative_elapsed_ms(&self) -> u64 {
        self.lock().policy.cumulative_elapsed_ms
    }

    pub fn is_visible(&self) -> bool {
        self.lock().policy.visible
    }

    pub fn is_refresh_exhausted(&self) -> bool {
        self.lock().policy.is_exhausted()
    }
}
