//! Slot lifecycle states.

use serde::Serialize;

/// Lifecycle state of a single slot.
///
/// ```text
/// Unformatted ──set_format──► Idle ──load──► Loading ──► Ready | Failed
/// Ready ──show──► Showing ──hide──► Ready
///                 Showing ──dismissed──► Idle
/// (any) ──destroy──► Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Unformatted,
    Idle,
    Loading,
    Ready,
    Failed,
    Showing,
    Destroyed,
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// An ad is loaded and held by the slot (shown or not).
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Ready | Self::Showing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unformatted => "unformatted",
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Showing => "showing",
            Self::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who started a load.
///
/// Only fresh loads reset an inline slot's refresh budget; reloads started by the
/// refresh timer keep accumulating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrigin {
    Fresh,
    Refresh,
}

/// Result of a load request that was not declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// A new ad handle was created and its load requested.
    Started,
    /// A load for this slot is already in flight; nothing was done.
    InFlight,
    /// An ad is already loaded, waiting or on screen; nothing was loaded.
    AlreadyLoaded,
}
