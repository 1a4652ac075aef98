//! Per-style registries mapping placement keys to slot controllers.
//!
//! Slots are created lazily on first access and live until destroyed. Access to
//! different keys never contends on a shared lock.

use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::{Clock, MonotonicClock};
use crate::config::SlotConfig;
use crate::controller::{AdSlotController, Presentation, SlotEnv, SourceInit};
use crate::dispatch::Dispatcher;
use crate::error::SlotError;
use crate::format::AdFormat;
use crate::initializer::{AdSourceInitializer, InitConfig, SourceBootstrap};
use crate::inline::InlineRefreshScheduler;
use crate::observer::{NoopObserver, SlotObserver};
use crate::overlay::OverlayFrequencyGate;
use crate::source::AdSource;

pub type InlineSlot = AdSlotController<InlineRefreshScheduler>;
pub type OverlaySlot = AdSlotController<OverlayFrequencyGate>;
pub type InlineRegistry = AdSlotRegistry<InlineRefreshScheduler>;
pub type OverlayRegistry = AdSlotRegistry<OverlayFrequencyGate>;

/// Keyed collection of slots sharing one ad source, dispatcher and config.
pub struct AdSlotRegistry<P: Presentation> {
    slots: DashMap<String, Arc<AdSlotController<P>>>,
    env: SlotEnv,
    config: SlotConfig,
    default_format: Option<AdFormat>,
}

impl<P: Presentation> AdSlotRegistry<P> {
    pub fn new(source: Arc<dyn AdSource>, dispatcher: Dispatcher, config: SlotConfig) -> Self {
        Self {
            slots: DashMap::new(),
            env: SlotEnv {
                source,
                dispatcher,
                clock: Arc::new(MonotonicClock::new()),
                ad_units: Arc::new(DashMap::new()),
                observer: Arc::new(NoopObserver),
                source_init: None,
            },
            config,
            default_format: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SlotObserver>) -> Self {
        self.env.observer = observer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.env.clock = clock;
        self
    }

    /// Run `bootstrap` through `initializer` before the first load of any slot.
    pub fn with_initializer(
        mut self,
        initializer: Arc<AdSourceInitializer>,
        bootstrap: Arc<dyn SourceBootstrap>,
        config: InitConfig,
    ) -> Self {
        self.env.source_init = Some(SourceInit {
            initializer,
            bootstrap,
            config,
        });
        self
    }

    /// Preset the format of every slot this registry creates.
    pub fn with_default_format(mut self, format: AdFormat) -> Result<Self, SlotError> {
        if !P::valid_formats().contains(&format) {
            return Err(SlotError::InvalidFormat {
                format,
                style: P::STYLE,
                valid: P::valid_formats().to_vec(),
            });
        }
        self.default_format = Some(format);
        Ok(self)
    }

    /// The slot for `key`, created on first access.
    pub fn slot(&self, key: &str) -> Arc<AdSlotController<P>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }

        let entry = self.slots.entry(key.to_string()).or_insert_with(|| {
            let slot = AdSlotController::new(
                key.to_string(),
                P::from_config(&self.config),
                self.env.clone(),
            );
            if let Some(format) = self.default_format
                && let Err(e) = slot.set_format(format)
            {
                tracing::error!(slot = %key, error = %e, "Default format rejected");
            }
            tracing::debug!(slot = %key, style = P::STYLE.as_str(), "Slot created");
            slot
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, key: &str) -> Option<Arc<AdSlotController<P>>> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    pub fn set_ad_unit_id(&self, key: &str, ad_unit_id: impl Into<String>) {
        let ad_unit_id = ad_unit_id.into();
        tracing::debug!(slot = %key, ad_unit = %ad_unit_id, "Ad unit id set");
        self.env.ad_units.insert(key.to_string(), ad_unit_id);
    }

    pub fn ad_unit_id(&self, key: &str) -> Option<String> {
        self.env.ad_units.get(key).map(|id| id.clone())
    }

    /// Destroy and forget the slot for `key`. The ad unit id is kept.
    pub fn destroy(&self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some((_, slot)) => {
                slot.destroy();
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&self) {
        let keys = self.keys();
        for key in &keys {
            self.destroy(key);
        }
        if !keys.is_empty() {
            tracing::info!(count = keys.len(), style = P::STYLE.as_str(), "Destroyed all slots");
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }
}

impl<P: Presentation> std::fmt::Debug for AdSlotRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdSlotRegistry")
            .field("style", &P::STYLE)
            .field("slots", &self.slots.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline::VisibilityEvent;
    use crate::state::SlotState;
    use crate::testkit::{FakeSource, Harness, settle};

    #[tokio::test(start_paused = true)]
    async fn slots_are_created_lazily_and_reused() {
        let h = Harness::<InlineRefreshScheduler>::new();
        assert!(h.registry.is_empty());
        assert!(h.registry.get("home_banner").is_none());

        let a = h.registry.slot("home_banner");
        let b = h.registry.slot("home_banner");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.state(), SlotState::Unformatted);
        assert_eq!(h.registry.keys(), vec!["home_banner"]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_access_creates_one_slot_per_key() {
        let h = Harness::<OverlayFrequencyGate>::new();
        let registry = &h.registry;

        let slots: Vec<Arc<OverlaySlot>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| s.spawn(move || registry.slot(if i % 2 == 0 { "a" } else { "b" })))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.len(), 2);
        let a = registry.slot("a");
        assert_eq!(slots.iter().filter(|s| Arc::ptr_eq(s, &a)).count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn ad_unit_ids_are_per_key() {
        let h = Harness::<OverlayFrequencyGate>::new();
        h.registry.set_ad_unit_id("exit", "unit/exit");
        assert_eq!(h.registry.ad_unit_id("exit").as_deref(), Some("unit/exit"));
        assert_eq!(h.registry.ad_unit_id("splash"), None);

        h.registry.set_ad_unit_id("exit", "unit/exit-v2");
        assert_eq!(h.registry.ad_unit_id("exit").as_deref(), Some("unit/exit-v2"));
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_removes_the_slot() {
        let h = Harness::<OverlayFrequencyGate>::new();
        let old = h.overlay_slot("exit");
        old.load().unwrap();
        settle().await;

        assert!(h.registry.destroy("exit"));
        assert!(!h.registry.destroy("exit"));
        assert_eq!(old.state(), SlotState::Destroyed);

        let fresh = h.registry.slot("exit");
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.state(), SlotState::Unformatted);
        assert_eq!(h.registry.ad_unit_id("exit").as_deref(), Some("unit/exit"));
    }

    #[tokio::test(start_paused = true)]
    async fn destroying_one_key_leaves_other_timers_alone() {
        let h = Harness::<InlineRefreshScheduler>::new();
        let top = h.inline_slot("top");
        let bottom = h.inline_slot("bottom");
        top.on_visibility(VisibilityEvent::Attached);
        bottom.on_visibility(VisibilityEvent::Attached);
        settle().await;
        assert_eq!(h.dispatcher.pending(), 2);

        h.registry.destroy("top");
        assert_eq!(h.dispatcher.pending_for("top"), 0);
        assert_eq!(h.dispatcher.pending_for("bottom"), 1);
        assert_eq!(bottom.state(), SlotState::Showing);

        h.registry.destroy_all();
        assert!(h.registry.is_empty());
        assert_eq!(h.dispatcher.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_format_is_applied_and_validated() {
        let source = Arc::new(FakeSource::default());
        let registry =
            InlineRegistry::new(source.clone(), Dispatcher::spawn(), SlotConfig::builtin())
                .with_default_format(AdFormat::Native)
                .unwrap();
        let slot = registry.slot("feed");
        assert_eq!(slot.format(), Some(AdFormat::Native));
        assert_eq!(slot.state(), SlotState::Idle);

        let err = OverlayRegistry::new(source, Dispatcher::spawn(), SlotConfig::builtin())
            .with_default_format(AdFormat::Banner)
            .unwrap_err();
        assert!(matches!(err, SlotError::InvalidFormat { .. }));
    }
}
