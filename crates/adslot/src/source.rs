//! Interface to the ad network that actually fetches and renders creatives.
//!
//! The controller never talks to a network directly. It asks an [`AdSource`] to
//! create a handle, load it, show it and destroy it, and learns about results
//! through the [`AdListener`] it hands over at creation time.

use std::sync::Weak;

use crate::dispatch::Dispatcher;
use crate::error::SourceError;
use crate::format::AdFormat;

/// Opaque reference to one creative owned by the ad source.
///
/// Exclusively owned by the slot that created it: not `Clone`, and released
/// through [`AdSource::destroy`] before the slot creates another.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AdHandle(u64);

impl AdHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AdHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ad-{}", self.0)
    }
}

/// Where a creative should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget<'a> {
    /// Inside the host container registered for this placement key.
    Inline { key: &'a str },
    /// Full screen, owned by the ad source until dismissed.
    Overlay { key: &'a str },
}

/// Ad network client.
///
/// Implementations must not block: `load` returns immediately and completion is
/// reported later through the listener, from any thread.
pub trait AdSource: Send + Sync {
    fn create(
        &self,
        ad_unit_id: &str,
        format: AdFormat,
        listener: AdListener,
    ) -> Result<AdHandle, SourceError>;

    fn load(&self, handle: &AdHandle);

    fn show(&self, handle: &AdHandle, target: ShowTarget<'_>) -> Result<(), SourceError>;

    /// Remove an inline creative from its container without releasing it.
    fn detach(&self, _handle: &AdHandle) {}

    fn destroy(&self, handle: AdHandle);

    fn pause(&self, _handle: &AdHandle) {}

    fn resume(&self, _handle: &AdHandle) {}
}

/// Receiving end of listener callbacks inside a slot controller.
pub(crate) trait SlotCallbacks: Send + Sync {
    fn handle_loaded(&self, ticket: u64);
    fn handle_load_failed(&self, ticket: u64, reason: String);
    fn handle_dismissed(&self, ticket: u64);
    fn handle_clicked(&self, ticket: u64);
    fn handle_impression(&self, ticket: u64);
}

/// Callbacks for one ad handle, handed to [`AdSource::create`].
///
/// Every callback is queued on the dispatch loop, so it is safe to invoke from
/// inside `AdSource::load`/`show` or from any network thread. Callbacks for a
/// handle the slot has since released are ignored.
#[derive(Clone)]
pub struct AdListener {
    key: String,
    ticket: u64,
    target: Weak<dyn SlotCallbacks>,
    dispatcher: Dispatcher,
}

impl AdListener {
    pub(crate) fn new(
        key: String,
        ticket: u64,
        target: Weak<dyn SlotCallbacks>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            key,
            ticket,
            target,
            dispatcher,
        }
    }

    /// Placement key of the slot this listener reports to.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn deliver<F>(&self, f: F)
    where
        F: FnOnce(&dyn SlotCallbacks, u64) + Send + 'static,
    {
        let target = self.target.clone();
        let ticket = self.ticket;
        self.dispatcher.post(move || {
            if let Some(slot) = target.upgrade() {
                f(slot.as_ref(), ticket);
            }
        });
    }

    pub fn on_loaded(&self) {
        self.deliver(|slot, ticket| slot.handle_loaded(ticket));
    }

    pub fn on_failed_to_load(&self, description: impl Into<String>) {
        let reason = description.into();
        self.deliver(move |slot, ticket| slot.handle_load_failed(ticket, reason));
    }

    pub fn on_dismissed(&self) {
        self.deliver(|slot, ticket| slot.handle_dismissed(ticket));
    }

    pub fn on_clicked(&self) {
        self.deliver(|slot, ticket| slot.handle_clicked(ticket));
    }

    pub fn on_impression(&self) {
        self.deliver(|slot, ticket| slot.handle_impression(ticket));
    }
}

impl std::fmt::Debug for AdListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdListener")
            .field("key", &self.key)
            .field("ticket", &self.ticket)
            .finish()
    }
}
