//! adslot: lifecycle controller for remotely-sourced ad slots.
//!
//! Each placement key gets an [`AdSlotController`] that loads a creative through an
//! [`AdSource`], shows it when admitted and releases it when done. Inline slots
//! ([`InlineRefreshScheduler`]) refresh themselves within a cumulative time budget
//! while visible; overlay slots ([`OverlayFrequencyGate`]) enforce a minimum gap
//! between shows. [`AdSourceInitializer`] runs the network's setup exactly once.
//!
//! ```ignore
//! let dispatcher = Dispatcher::spawn();
//! let banners = InlineRegistry::new(source, dispatcher, SlotConfig::default());
//! banners.set_ad_unit_id("home_banner", "ca-app-pub-xxx/yyy");
//!
//! let slot = banners.slot("home_banner");
//! slot.set_format(AdFormat::Banner)?;
//! slot.on_visibility(VisibilityEvent::Attached);
//! ```

mod clock;
mod config;
mod controller;
mod dispatch;
mod error;
mod format;
mod initializer;
mod inline;
mod observer;
mod overlay;
mod registry;
mod source;
mod state;
pub mod telemetry;

#[cfg(test)]
mod testkit;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::{
    DEFAULT_MAX_REFRESH_WINDOW_MS, DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_TIME_GAP_MS, SlotConfig,
};
pub use controller::{
    AdSlotController, HideAction, PolicySnapshot, Presentation, SlotSnapshot, TimerAction,
    TimerPlan,
};
pub use dispatch::{Dispatcher, TimerToken};
pub use error::{ShowDecline, SlotError, SourceError};
pub use format::{AdFormat, PresentationStyle};
pub use initializer::{
    AdSourceInitializer, AdapterStatus, InitCompletion, InitConfig, InitOutcome, InitReport,
    SourceBootstrap,
};
pub use inline::{InlineRefreshScheduler, VisibilityEvent};
pub use observer::{NoopObserver, SlotObserver};
pub use overlay::OverlayFrequencyGate;
pub use registry::{AdSlotRegistry, InlineRegistry, InlineSlot, OverlayRegistry, OverlaySlot};
pub use source::{AdHandle, AdListener, AdSource, ShowTarget};
pub use state::{LoadOrigin, LoadStatus, SlotState};
