//! Declines and errors surfaced by slot operations.
//!
//! Nothing here is fatal: every variant describes an operation that was refused
//! and left the slot as it was.

use crate::format::{AdFormat, PresentationStyle};
use crate::state::SlotState;

fn format_list(formats: &[AdFormat]) -> String {
    formats
        .iter()
        .map(AdFormat::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration errors and misuse reported by slot operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("format {format} is not valid for {style} slots (valid formats: {})", format_list(.valid))]
    InvalidFormat {
        format: AdFormat,
        style: PresentationStyle,
        valid: Vec<AdFormat>,
    },

    #[error("format already set to {current}")]
    FormatLocked { current: AdFormat },

    #[error("ads format not set; call set_format() first")]
    FormatNotSet,

    #[error("ad unit id not configured for key '{key}'")]
    AdUnitNotConfigured { key: String },

    #[error("{name} must be {requirement}, got {value}")]
    InvalidTiming {
        name: &'static str,
        requirement: &'static str,
        value: i64,
    },

    #[error("slot destroyed")]
    Destroyed,

    #[error("ad source error: {0}")]
    Source(String),
}

impl SlotError {
    /// Valid formats reported by an `InvalidFormat` decline.
    pub fn valid_formats(&self) -> Option<&[AdFormat]> {
        match self {
            Self::InvalidFormat { valid, .. } => Some(valid),
            _ => None,
        }
    }
}

/// Reason a show attempt was not admitted.
///
/// Declines are a normal outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShowDecline {
    #[error("should-show flag is off")]
    ShowDisabled,

    #[error("slot is not visible")]
    NotVisible,

    #[error("ad not loaded yet (state: {state})")]
    NotLoaded { state: SlotState },

    #[error("ad already showing")]
    AlreadyShowing,

    #[error("time gap not satisfied ({elapsed_ms}ms since last dismissal, {required_ms}ms required)")]
    TimeGap { elapsed_ms: u64, required_ms: u64 },

    #[error("slot destroyed")]
    Destroyed,

    #[error("ad source refused to show: {0}")]
    Source(String),
}

/// Error returned by an [`AdSource`](crate::source::AdSource) primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_lists_valid_formats() {
        let err = SlotError::InvalidFormat {
            format: AdFormat::Native,
            style: PresentationStyle::Overlay,
            valid: PresentationStyle::Overlay.formats().to_vec(),
        };
        assert_eq!(
            err.to_string(),
            "format native is not valid for overlay slots (valid formats: interstitial, app_open)"
        );
        assert_eq!(
            err.valid_formats(),
            Some(&[AdFormat::Interstitial, AdFormat::AppOpen][..])
        );
    }

    #[test]
    fn decline_display() {
        let decline = ShowDecline::TimeGap {
            elapsed_ms: 9_995,
            required_ms: 25_000,
        };
        assert_eq!(
            decline.to_string(),
            "time gap not satisfied (9995ms since last dismissal, 25000ms required)"
        );

        let decline = ShowDecline::NotLoaded {
            state: SlotState::Loading,
        };
        assert_eq!(decline.to_string(), "ad not loaded yet (state: loading)");
    }

    #[test]
    fn invalid_timing_display() {
        let err = SlotError::InvalidTiming {
            name: "refresh interval",
            requirement: "greater than 0",
            value: -5,
        };
        assert_eq!(err.to_string(), "refresh interval must be greater than 0, got -5");
    }
}
