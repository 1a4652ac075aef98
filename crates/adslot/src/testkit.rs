//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::SlotConfig;
use crate::controller::Presentation;
use crate::dispatch::Dispatcher;
use crate::error::{ShowDecline, SourceError};
use crate::format::AdFormat;
use crate::initializer::{
    AdSourceInitializer, AdapterStatus, InitCompletion, InitConfig, InitReport, SourceBootstrap,
};
use crate::inline::InlineRefreshScheduler;
use crate::observer::SlotObserver;
use crate::overlay::OverlayFrequencyGate;
use crate::registry::{AdSlotRegistry, InlineSlot, OverlaySlot};
use crate::source::{AdHandle, AdListener, AdSource, ShowTarget};

/// Let the dispatch loop and any spawned timer tasks drain without advancing time.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create {
        ad_unit_id: String,
        format: AdFormat,
        handle: u64,
    },
    Load(u64),
    Show(u64),
    Detach(u64),
    Destroy(u64),
    Pause(u64),
    Resume(u64),
}

/// How [`FakeSource`] answers `load`.
#[derive(Debug, Clone, Default)]
pub(crate) enum LoadMode {
    #[default]
    Succeed,
    Fail(String),
    /// Leave completion to the test (`complete_last`, `fail_last`).
    Manual,
}

#[derive(Default)]
struct FakeState {
    mode: LoadMode,
    calls: Vec<Call>,
    listeners: Vec<(u64, AdListener)>,
    next_handle: u64,
    create_error: Option<String>,
    show_error: Option<String>,
}

/// In-memory ad source that records every call.
#[derive(Default)]
pub(crate) struct FakeSource {
    state: Mutex<FakeState>,
}

impl FakeSource {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_mode(&self, mode: LoadMode) {
        self.state().mode = mode;
    }

    pub fn fail_create(&self, reason: &str) {
        self.state().create_error = Some(reason.to_string());
    }

    pub fn fail_show(&self, reason: &str) {
        self.state().show_error = Some(reason.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    fn last_listener(&self) -> AdListener {
        let state = self.state();
        let (_, listener) = state.listeners.last().expect("no ad created yet");
        listener.clone()
    }

    fn listener_for(&self, handle: u64) -> Option<AdListener> {
        self.state()
            .listeners
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, l)| l.clone())
    }

    pub fn complete_last(&self) {
        self.last_listener().on_loaded();
    }

    pub fn fail_last(&self, reason: &str) {
        self.last_listener().on_failed_to_load(reason);
    }

    pub fn dismiss_last(&self) {
        self.last_listener().on_dismissed();
    }

    pub fn click_last(&self) {
        let listener = self.last_listener();
        listener.on_impression();
        listener.on_clicked();
    }
}

impl AdSource for FakeSource {
    fn create(
        &self,
        ad_unit_id: &str,
        format: AdFormat,
        listener: AdListener,
    ) -> Result<AdHandle, SourceError> {
        let mut state = self.state();
        if let Some(reason) = state.create_error.clone() {
            return Err(SourceError::new(reason));
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.calls.push(Call::Create {
            ad_unit_id: ad_unit_id.to_string(),
            format,
            handle,
        });
        state.listeners.push((handle, listener));
        Ok(AdHandle::new(handle))
    }

    fn load(&self, handle: &AdHandle) {
        let mode = {
            let mut state = self.state();
            state.calls.push(Call::Load(handle.raw()));
            state.mode.clone()
        };
        let Some(listener) = self.listener_for(handle.raw()) else {
            return;
        };
        match mode {
            LoadMode::Succeed => listener.on_loaded(),
            LoadMode::Fail(reason) => listener.on_failed_to_load(reason),
            LoadMode::Manual => {}
        }
    }

    fn show(&self, handle: &AdHandle, _target: ShowTarget<'_>) -> Result<(), SourceError> {
        let mut state = self.state();
        state.calls.push(Call::Show(handle.raw()));
        match state.show_error.clone() {
            Some(reason) => Err(SourceError::new(reason)),
            None => Ok(()),
        }
    }

    fn detach(&self, handle: &AdHandle) {
        self.state().calls.push(Call::Detach(handle.raw()));
    }

    fn destroy(&self, handle: AdHandle) {
        self.state().calls.push(Call::Destroy(handle.raw()));
    }

    fn pause(&self, handle: &AdHandle) {
        self.state().calls.push(Call::Pause(handle.raw()));
    }

    fn resume(&self, handle: &AdHandle) {
        self.state().calls.push(Call::Resume(handle.raw()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Loaded(String),
    LoadFailed(String, String),
    Shown(String),
    Declined(String, ShowDecline),
    Dismissed(String),
    Clicked(String),
    Impression(String),
}

/// Observer that keeps every notification in arrival order.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn collect<T>(&self, f: impl Fn(&Event) -> Option<T>) -> Vec<T> {
        self.events.lock().unwrap().iter().filter_map(f).collect()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.collect(|e| match e {
            Event::Loaded(k) => Some(k.clone()),
            _ => None,
        })
    }

    pub fn load_failures(&self) -> Vec<(String, String)> {
        self.collect(|e| match e {
            Event::LoadFailed(k, r) => Some((k.clone(), r.clone())),
            _ => None,
        })
    }

    pub fn shown(&self) -> Vec<String> {
        self.collect(|e| match e {
            Event::Shown(k) => Some(k.clone()),
            _ => None,
        })
    }

    pub fn declines(&self) -> Vec<(String, ShowDecline)> {
        self.collect(|e| match e {
            Event::Declined(k, d) => Some((k.clone(), d.clone())),
            _ => None,
        })
    }

    pub fn dismissed(&self) -> Vec<String> {
        self.collect(|e| match e {
            Event::Dismissed(k) => Some(k.clone()),
            _ => None,
        })
    }

    pub fn engagements(&self) -> Vec<String> {
        self.collect(|e| match e {
            Event::Clicked(k) => Some(format!("click:{k}")),
            Event::Impression(k) => Some(format!("impression:{k}")),
            _ => None,
        })
    }
}

impl SlotObserver for RecordingObserver {
    fn on_loaded(&self, key: &str) {
        self.push(Event::Loaded(key.to_string()));
    }

    fn on_load_failed(&self, key: &str, reason: &str) {
        self.push(Event::LoadFailed(key.to_string(), reason.to_string()));
    }

    fn on_shown(&self, key: &str) {
        self.push(Event::Shown(key.to_string()));
    }

    fn on_show_declined(&self, key: &str, reason: &ShowDecline) {
        self.push(Event::Declined(key.to_string(), reason.clone()));
    }

    fn on_dismissed(&self, key: &str) {
        self.push(Event::Dismissed(key.to_string()));
    }

    fn on_clicked(&self, key: &str) {
        self.push(Event::Clicked(key.to_string()));
    }

    fn on_impression(&self, key: &str) {
        self.push(Event::Impression(key.to_string()));
    }
}

#[derive(Default)]
struct CountingBootstrap {
    runs: AtomicUsize,
}

impl SourceBootstrap for CountingBootstrap {
    fn initialize(&self, _config: &InitConfig, completion: InitCompletion) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        completion.complete(InitReport {
            adapters: vec![AdapterStatus {
                name: "fake".to_string(),
                description: "ready".to_string(),
                latency: Duration::from_millis(3),
            }],
        });
    }
}

/// A registry wired to a [`FakeSource`] and a [`RecordingObserver`].
///
/// Must be built inside a Tokio runtime.
pub(crate) struct Harness<P: Presentation> {
    pub registry: AdSlotRegistry<P>,
    pub source: Arc<FakeSource>,
    pub observer: Arc<RecordingObserver>,
    pub dispatcher: Dispatcher,
    bootstrap: Arc<CountingBootstrap>,
    initializer: Arc<AdSourceInitializer>,
}

impl<P: Presentation> Harness<P> {
    pub fn new() -> Self {
        Self::build(SlotConfig::builtin(), None, false)
    }

    pub fn with_config(config: SlotConfig) -> Self {
        Self::build(config, None, false)
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(SlotConfig::builtin(), Some(clock), false)
    }

    pub fn with_bootstrap() -> Self {
        Self::build(SlotConfig::builtin(), None, true)
    }

    fn build(config: SlotConfig, clock: Option<Arc<dyn Clock>>, bootstrap: bool) -> Self {
        let source = Arc::new(FakeSource::default());
        let observer = Arc::new(RecordingObserver::default());
        let dispatcher = Dispatcher::spawn();
        let counting = Arc::new(CountingBootstrap::default());
        let initializer = Arc::new(AdSourceInitializer::new());

        let mut registry = AdSlotRegistry::new(source.clone(), dispatcher.clone(), config)
            .with_observer(observer.clone());
        if let Some(clock) = clock {
            registry = registry.with_clock(clock);
        }
        if bootstrap {
            registry = registry.with_initializer(
                initializer.clone(),
                counting.clone(),
                InitConfig {
                    test_device_ids: vec!["test-device".to_string()],
                },
            );
        }

        Self {
            registry,
            source,
            observer,
            dispatcher,
            bootstrap: counting,
            initializer,
        }
    }

    pub fn bootstrap_runs(&self) -> usize {
        self.bootstrap.runs.load(Ordering::SeqCst)
    }

    pub fn initializer(&self) -> &AdSourceInitializer {
        &self.initializer
    }
}

impl Harness<OverlayFrequencyGate> {
    /// An interstitial slot with its ad unit id configured.
    pub fn overlay_slot(&self, key: &str) -> Arc<OverlaySlot> {
        self.registry.set_ad_unit_id(key, format!("unit/{key}"));
        let slot = self.registry.slot(key);
        slot.set_format(AdFormat::Interstitial).unwrap();
        slot
    }
}

impl Harness<InlineRefreshScheduler> {
    /// A banner slot with its ad unit id configured.
    pub fn inline_slot(&self, key: &str) -> Arc<InlineSlot> {
        self.registry.set_ad_unit_id(key, format!("unit/{key}"));
        let slot = self.registry.slot(key);
        slot.set_format(AdFormat::Banner).unwrap();
        slot
    }
}
