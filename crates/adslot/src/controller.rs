//! Slot controller - the per-key lifecycle state machine.
//!
//! One [`AdSlotController`] owns one placement: its format, its should-show flag,
//! its state and the ad handle produced by the [`AdSource`]. Presentation-specific
//! timing policy (inline refresh, overlay frequency capping) plugs in through the
//! [`Presentation`] trait instead of subclassing.
//!
//! Rules:
//! - All transitions for one key are serialized by the slot's lock.
//! - At most one load is in flight per slot; a second `load()` is a no-op.
//! - Listener callbacks and timers run on the dispatch loop and carry the ticket /
//!   epoch they were issued under, so anything issued before a release or a
//!   cancellation is ignored when it arrives.
//! - The handle is released through the source before a new one is created.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::SlotConfig;
use crate::dispatch::{Dispatcher, TimerToken};
use crate::error::{ShowDecline, SlotError};
use crate::format::{AdFormat, PresentationStyle};
use crate::initializer::{AdSourceInitializer, InitConfig, SourceBootstrap};
use crate::observer::SlotObserver;
use crate::source::{AdHandle, AdListener, AdSource, ShowTarget, SlotCallbacks};
use crate::state::{LoadOrigin, LoadStatus, SlotState};

/// Timer directive returned by presentation hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPlan {
    /// Leave any pending timer alone.
    Keep,
    /// Cancel the pending timer, if any.
    Cancel,
    /// Replace the pending timer with one firing after the given delay.
    Schedule(Duration),
}

/// What to do when the slot's timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Nothing; wait for the next external event.
    Ignore,
    /// The automatic-refresh budget is spent; stop for good.
    Stop,
    /// Release the current creative and load a new one.
    Reload,
}

/// What `hide()` means for a presentation style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideAction {
    /// Detach the creative from its container and go back to `Ready`.
    Detach,
    /// Nothing to do; the ad source owns visibility.
    Ignore,
}

/// Presentation-specific policy composed into a slot controller.
///
/// Hooks run under the slot's lock and must not block.
pub trait Presentation: Send + Sized + 'static {
    const STYLE: PresentationStyle;

    fn from_config(config: &SlotConfig) -> Self;

    fn valid_formats() -> &'static [AdFormat] {
        Self::STYLE.formats()
    }

    /// Style-specific gate checked after the should-show flag.
    fn admission(&self, now_ms: u64) -> Result<(), ShowDecline>;

    fn on_show(&mut self, _now_ms: u64) {}

    fn on_hide(&self) -> HideAction;

    /// Whether a freshly loaded ad should be shown right away.
    fn shows_on_load(&self) -> bool;

    fn on_loaded(&mut self, now_ms: u64, origin: LoadOrigin) -> TimerPlan;

    fn on_load_failed(&mut self, now_ms: u64) -> TimerPlan;

    fn on_dismissed(&mut self, _now_ms: u64) {}

    fn on_timer(&mut self, _now_ms: u64) -> TimerAction {
        TimerAction::Ignore
    }

    fn snapshot(&self) -> PolicySnapshot;
}

/// Presentation policy data included in a [`SlotSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum PolicySnapshot {
    Inline {
        visible: bool,
        refresh_interval_ms: u64,
        max_refresh_window_ms: u64,
        cumulative_elapsed_ms: u64,
        exhausted: bool,
    },
    Overlay {
        time_gap_ms: u64,
        last_dismissed_at_ms: Option<u64>,
    },
}

/// Point-in-time view of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub key: String,
    pub style: PresentationStyle,
    pub format: Option<AdFormat>,
    pub state: SlotState,
    pub should_show: bool,
    pub has_handle: bool,
    pub timer_pending: bool,
    pub policy: PolicySnapshot,
}

/// Bootstrap consulted before a slot's first load.
#[derive(Clone)]
pub(crate) struct SourceInit {
    pub initializer: Arc<AdSourceInitializer>,
    pub bootstrap: Arc<dyn SourceBootstrap>,
    pub config: InitConfig,
}

/// Collaborators shared by every slot of a registry.
#[derive(Clone)]
pub(crate) struct SlotEnv {
    pub source: Arc<dyn AdSource>,
    pub dispatcher: Dispatcher,
    pub clock: Arc<dyn Clock>,
    pub ad_units: Arc<DashMap<String, String>>,
    pub observer: Arc<dyn SlotObserver>,
    pub source_init: Option<SourceInit>,
}

impl SlotEnv {
    fn ensure_source_initialized(&self) {
        if let Some(init) = &self.source_init
            && !init.initializer.is_claimed()
        {
            init.initializer
                .initialize(init.bootstrap.as_ref(), &init.config, |report| {
                    tracing::debug!(adapters = report.adapters.len(), "Ad source ready");
                });
        }
    }
}

/// Mutable slot data, guarded by the slot's lock.
pub(crate) struct SlotCore<P> {
    pub state: SlotState,
    pub format: Option<AdFormat>,
    pub should_show: bool,
    pub handle: Option<AdHandle>,
    /// Identifies the current handle; listener callbacks with another ticket are stale.
    pub ticket: u64,
    pub origin: LoadOrigin,
    pub show_when_ready: bool,
    pub timer: Option<TimerToken>,
    /// Bumped on every cancel/schedule; a firing timer with an older epoch is stale.
    pub timer_epoch: u64,
    pub policy: P,
}

/// Lifecycle controller for one placement key.
pub struct AdSlotController<P: Presentation> {
    key: String,
    core: Mutex<SlotCore<P>>,
    env: SlotEnv,
    this: Weak<Self>,
}

impl<P: Presentation> AdSlotController<P> {
    pub(crate) fn new(key: String, policy: P, env: SlotEnv) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            key,
            core: Mutex::new(SlotCore {
                state: SlotState::Unformatted,
                format: None,
                should_show: true,
                handle: None,
                ticket: 0,
                origin: LoadOrigin::Fresh,
                show_when_ready: false,
                timer: None,
                timer_epoch: 0,
                policy,
            }),
            env,
            this: this.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotCore<P>> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(slot = %self.key, "Slot lock poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.env.clock.now_ms()
    }

    pub(crate) fn source(&self) -> &dyn AdSource {
        self.env.source.as_ref()
    }

    pub fn state(&self) -> SlotState {
        self.lock().state
    }

    pub fn format(&self) -> Option<AdFormat> {
        self.lock().format
    }

    pub fn should_show(&self) -> bool {
        self.lock().should_show
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().state.is_loaded()
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        let core = self.lock();
        SlotSnapshot {
            key: self.key.clone(),
            style: P::STYLE,
            format: core.format,
            state: core.state,
            should_show: core.should_show,
            has_handle: core.handle.is_some(),
            timer_pending: core.timer.is_some(),
            policy: core.policy.snapshot(),
        }
    }

    /// Set the slot's format. Accepted once; re-setting the same format is a no-op.
    pub fn set_format(&self, format: AdFormat) -> Result<(), SlotError> {
        let mut core = self.lock();

        if core.state == SlotState::Destroyed {
            tracing::debug!(slot = %self.key, %format, "set_format on destroyed slot ignored");
            return Ok(());
        }

        if !P::valid_formats().contains(&format) {
            let err = SlotError::InvalidFormat {
                format,
                style: P::STYLE,
                valid: P::valid_formats().to_vec(),
            };
            tracing::warn!(slot = %self.key, reason = %err, "Format declined");
            return Err(err);
        }

        match core.format {
            Some(current) if current == format => Ok(()),
            Some(current) => {
                tracing::warn!(
                    slot = %self.key,
                    %current,
                    requested = %format,
                    "Format already set"
                );
                Err(SlotError::FormatLocked { current })
            }
            None => {
                core.format = Some(format);
                if core.state == SlotState::Unformatted {
                    core.state = SlotState::Idle;
                }
                tracing::debug!(slot = %self.key, %format, "Ads format set");
                Ok(())
            }
        }
    }

    /// Request a fresh ad. Resets an inline slot's refresh budget once it loads.
    pub fn load(&self) -> Result<LoadStatus, SlotError> {
        let mut core = self.lock();
        self.start_load_locked(&mut core, LoadOrigin::Fresh)
    }

    /// Load and show as soon as the ad is ready.
    pub fn load_and_show(&self) -> Result<LoadStatus, SlotError> {
        let mut core = self.lock();
        if core.state == SlotState::Ready {
            let _ = self.show_locked(&mut core, true);
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let status = self.start_load_locked(&mut core, LoadOrigin::Fresh)?;
        if status != LoadStatus::AlreadyLoaded {
            core.show_when_ready = true;
        }
        Ok(status)
    }

    /// Try to present the loaded ad.
    ///
    /// Declines are reported to the observer and returned; they are not faults.
    pub fn show(&self) -> Result<(), ShowDecline> {
        let mut core = self.lock();
        self.show_locked(&mut core, true)
    }

    pub fn hide(&self) {
        let mut core = self.lock();
        self.hide_locked(&mut core);
    }

    /// Turning the flag off hides a showing ad; turning it on shows a loaded one.
    pub fn set_should_show(&self, should_show: bool) {
        let mut core = self.lock();
        if core.state == SlotState::Destroyed {
            return;
        }
        core.should_show = should_show;
        tracing::debug!(slot = %self.key, should_show, "Should-show flag changed");

        if !should_show {
            self.hide_locked(&mut core);
        } else if core.state == SlotState::Ready {
            let _ = self.show_locked(&mut core, false);
        }
    }

    /// Cancel timers, release the handle and enter `Destroyed`. Idempotent.
    pub fn destroy(&self) {
        let mut core = self.lock();
        if core.state == SlotState::Destroyed {
            return;
        }
        self.cancel_timer_locked(&mut core);
        self.env.dispatcher.cancel_key(&self.key);
        self.release_handle_locked(&mut core);
        core.ticket += 1;
        core.show_when_ready = false;
        core.state = SlotState::Destroyed;
        tracing::info!(slot = %self.key, "Slot destroyed");
    }

    pub(crate) fn start_load_locked(
        &self,
        core: &mut SlotCore<P>,
        origin: LoadOrigin,
    ) -> Result<LoadStatus, SlotError> {
        let format = match core.state {
            SlotState::Destroyed => return Err(SlotError::Destroyed),
            SlotState::Loading => {
                tracing::debug!(slot = %self.key, "Load already in flight");
                return Ok(LoadStatus::InFlight);
            }
            SlotState::Showing if core.policy.on_hide() == HideAction::Ignore => {
                tracing::debug!(slot = %self.key, "Ad on screen, load after dismissal");
                return Ok(LoadStatus::AlreadyLoaded);
            }
            _ => match core.format {
                Some(format) => format,
                None => {
                    tracing::warn!(slot = %self.key, "Ads format not set. Call set_format() first");
                    return Err(SlotError::FormatNotSet);
                }
            },
        };

        let ad_unit_id = match self.env.ad_units.get(&self.key) {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => {
                tracing::warn!(slot = %self.key, "Ad unit id not configured");
                return Err(SlotError::AdUnitNotConfigured {
                    key: self.key.clone(),
                });
            }
        };

        self.env.ensure_source_initialized();
        self.release_handle_locked(core);

        core.ticket += 1;
        core.origin = origin;
        let target: Weak<dyn SlotCallbacks> = self.this.clone();
        let listener = AdListener::new(
            self.key.clone(),
            core.ticket,
            target,
            self.env.dispatcher.clone(),
        );

        match self.env.source.create(&ad_unit_id, format, listener) {
            Ok(handle) => {
                core.state = SlotState::Loading;
                tracing::info!(
                    slot = %self.key,
                    %format,
                    ad_unit = %ad_unit_id,
                    ?origin,
                    handle = %handle,
                    "Loading ad"
                );
                self.env.source.load(&handle);
                core.handle = Some(handle);
                Ok(LoadStatus::Started)
            }
            Err(e) => {
                let reason = e.to_string();
                self.fail_load_locked(core, &reason);
                Err(SlotError::Source(reason))
            }
        }
    }

    pub(crate) fn show_locked(
        &self,
        core: &mut SlotCore<P>,
        report: bool,
    ) -> Result<(), ShowDecline> {
        let result = self.try_show_locked(core);
        match &result {
            Ok(()) => {
                tracing::info!(slot = %self.key, "Ad shown");
                self.notify(|o, key| o.on_shown(key));
            }
            Err(decline) => {
                tracing::debug!(slot = %self.key, reason = %decline, "Skipping show");
                if report {
                    let decline = decline.clone();
                    self.notify(move |o, key| o.on_show_declined(key, &decline));
                }
            }
        }
        result
    }

    fn try_show_locked(&self, core: &mut SlotCore<P>) -> Result<(), ShowDecline> {
        match core.state {
            SlotState::Destroyed => return Err(ShowDecline::Destroyed),
            _ if !core.should_show => return Err(ShowDecline::ShowDisabled),
            _ => {}
        }

        let now = self.now_ms();
        core.policy.admission(now)?;

        match core.state {
            SlotState::Ready => {}
            SlotState::Showing => return Err(ShowDecline::AlreadyShowing),
            state => return Err(ShowDecline::NotLoaded { state }),
        }

        let Some(handle) = core.handle.as_ref() else {
            tracing::error!(slot = %self.key, "Bug: ready slot has no handle");
            return Err(ShowDecline::NotLoaded { state: core.state });
        };

        let target = match P::STYLE {
            PresentationStyle::Inline => ShowTarget::Inline { key: &self.key },
            PresentationStyle::Overlay => ShowTarget::Overlay { key: &self.key },
        };
        self.env
            .source
            .show(handle, target)
            .map_err(|e| ShowDecline::Source(e.to_string()))?;

        core.state = SlotState::Showing;
        core.policy.on_show(now);
        Ok(())
    }

    pub(crate) fn hide_locked(&self, core: &mut SlotCore<P>) {
        match core.policy.on_hide() {
            HideAction::Ignore => {
                tracing::debug!(slot = %self.key, "hide is a no-op for overlay slots");
            }
            HideAction::Detach => {
                if core.state == SlotState::Showing {
                    if let Some(handle) = core.handle.as_ref() {
                        self.env.source.detach(handle);
                    }
                    core.state = SlotState::Ready;
                    tracing::debug!(slot = %self.key, "Ad hidden");
                }
            }
        }
    }

    /// Detach (if showing) and destroy the current handle.
    pub(crate) fn release_handle_locked(&self, core: &mut SlotCore<P>) {
        if let Some(handle) = core.handle.take() {
            if core.state == SlotState::Showing && core.policy.on_hide() == HideAction::Detach {
                self.env.source.detach(&handle);
            }
            tracing::debug!(slot = %self.key, handle = %handle, "Releasing ad handle");
            self.env.source.destroy(handle);
        }
    }

    fn fail_load_locked(&self, core: &mut SlotCore<P>, reason: &str) {
        core.state = SlotState::Failed;
        core.show_when_ready = false;
        self.release_handle_locked(core);
        tracing::warn!(slot = %self.key, reason, "Ad failed to load");

        let plan = core.policy.on_load_failed(self.now_ms());
        self.apply_timer_plan_locked(core, plan);

        let reason = reason.to_string();
        self.notify(move |o, key| o.on_load_failed(key, &reason));
    }

    pub(crate) fn apply_timer_plan_locked(&self, core: &mut SlotCore<P>, plan: TimerPlan) {
        match plan {
            TimerPlan::Keep => {}
            TimerPlan::Cancel => self.cancel_timer_locked(core),
            TimerPlan::Schedule(delay) => self.schedule_timer_locked(core, delay),
        }
    }

    pub(crate) fn schedule_timer_locked(&self, core: &mut SlotCore<P>, delay: Duration) {
        self.cancel_timer_locked(core);
        let epoch = core.timer_epoch;
        let this = self.this.clone();
        let token = self.env.dispatcher.schedule(&self.key, delay, move || {
            if let Some(slot) = this.upgrade() {
                slot.on_timer(epoch);
            }
        });
        core.timer = Some(token);
        tracing::debug!(
            slot = %self.key,
            delay_ms = delay.as_millis() as u64,
            "Next refresh scheduled"
        );
    }

    pub(crate) fn cancel_timer_locked(&self, core: &mut SlotCore<P>) {
        core.timer_epoch += 1;
        if let Some(token) = core.timer.take() {
            self.env.dispatcher.cancel(token);
        }
    }

    fn on_timer(&self, epoch: u64) {
        let mut core = self.lock();
        if epoch != core.timer_epoch || core.state == SlotState::Destroyed {
            tracing::trace!(slot = %self.key, "Ignoring stale timer");
            return;
        }
        core.timer = None;
        let action = core.policy.on_timer(self.now_ms());
        self.run_timer_action_locked(&mut core, action);
    }

    pub(crate) fn run_timer_action_locked(&self, core: &mut SlotCore<P>, action: TimerAction) {
        match action {
            TimerAction::Ignore => {}
            TimerAction::Stop => {
                self.cancel_timer_locked(core);
                tracing::info!(slot = %self.key, "Refresh budget reached, stopping auto refresh");
            }
            TimerAction::Reload => {
                if core.state == SlotState::Loading {
                    tracing::debug!(slot = %self.key, "Load in flight, skipping refresh");
                    return;
                }
                tracing::debug!(slot = %self.key, "Refreshing ad");
                if let Err(e) = self.start_load_locked(core, LoadOrigin::Refresh) {
                    tracing::warn!(slot = %self.key, error = %e, "Refresh could not start a load");
                }
            }
        }
    }

    /// Queue an observer notification behind everything already on the dispatch loop.
    fn notify<F>(&self, f: F)
    where
        F: FnOnce(&dyn SlotObserver, &str) + Send + 'static,
    {
        let observer = Arc::clone(&self.env.observer);
        let key = self.key.clone();
        self.env.dispatcher.post(move || f(observer.as_ref(), &key));
    }

    fn is_current(&self, core: &SlotCore<P>, ticket: u64) -> bool {
        ticket == core.ticket && core.state != SlotState::Destroyed
    }
}

impl<P: Presentation> SlotCallbacks for AdSlotController<P> {
    fn handle_loaded(&self, ticket: u64) {
        let mut core = self.lock();
        if !self.is_current(&core, ticket) || core.state != SlotState::Loading {
            tracing::debug!(slot = %self.key, ticket, "Ignoring stale load result");
            return;
        }

        core.state = SlotState::Ready;
        let now = self.now_ms();
        let origin = core.origin;
        tracing::info!(slot = %self.key, ?origin, "Ad loaded");
        self.notify(|o, key| o.on_loaded(key));

        let plan = core.policy.on_loaded(now, origin);
        self.apply_timer_plan_locked(&mut core, plan);

        if std::mem::take(&mut core.show_when_ready) {
            let _ = self.show_locked(&mut core, true);
        } else if core.should_show && core.policy.shows_on_load() {
            let _ = self.show_locked(&mut core, false);
        }
    }

    fn handle_load_failed(&self, ticket: u64, reason: String) {
        let mut core = self.lock();
        if !self.is_current(&core, ticket) || core.state != SlotState::Loading {
            tracing::debug!(slot = %self.key, ticket, "Ignoring stale load failure");
            return;
        }
        self.fail_load_locked(&mut core, &reason);
    }

    fn handle_dismissed(&self, ticket: u64) {
        let mut core = self.lock();
        if core.state == SlotState::Destroyed {
            return;
        }
        if ticket == core.ticket && core.state == SlotState::Showing {
            core.state = SlotState::Idle;
            if let Some(handle) = core.handle.take() {
                self.env.source.destroy(handle);
            }
        }
        core.policy.on_dismissed(self.now_ms());
        tracing::info!(slot = %self.key, "Ad dismissed");
        self.notify(|o, key| o.on_dismissed(key));
    }

    fn handle_clicked(&self, ticket: u64) {
        tracing::debug!(slot = %self.key, ticket, "Ad clicked");
        self.notify(|o, key| o.on_clicked(key));
    }

    fn handle_impression(&self, ticket: u64) {
        tracing::debug!(slot = %self.key, ticket, "Ad impression");
        self.notify(|o, key| o.on_impression(key));
    }
}

impl<P: Presentation> std::fmt::Debug for AdSlotController<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdSlotController")
            .field("key", &self.key)
            .field("style", &P::STYLE)
            .finish()
    }
}
