//! Hooks for hosts that want to react to slot outcomes.

use crate::error::ShowDecline;

/// Receives slot outcomes. All methods default to no-ops.
///
/// Notifications are delivered on the dispatch loop in the order they happened,
/// never while the slot's lock is held, so an observer may call back into the slot.
pub trait SlotObserver: Send + Sync {
    fn on_loaded(&self, _key: &str) {}

    fn on_load_failed(&self, _key: &str, _reason: &str) {}

    fn on_shown(&self, _key: &str) {}

    /// A show attempt was declined: gated, not loaded, or refused by the source.
    fn on_show_declined(&self, _key: &str, _reason: &ShowDecline) {}

    fn on_dismissed(&self, _key: &str) {}

    fn on_clicked(&self, _key: &str) {}

    fn on_impression(&self, _key: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SlotObserver for NoopObserver {}
