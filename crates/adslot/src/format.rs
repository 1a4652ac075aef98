//! Ad formats and the presentation style each one belongs to.

use serde::{Deserialize, Serialize};

/// Creative format of a slot. Closed set; a slot's format is set at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdFormat {
    Banner,
    Native,
    Interstitial,
    AppOpen,
}

impl AdFormat {
    pub const ALL: [AdFormat; 4] = [
        AdFormat::Banner,
        AdFormat::Native,
        AdFormat::Interstitial,
        AdFormat::AppOpen,
    ];

    pub fn style(&self) -> PresentationStyle {
        match self {
            Self::Banner | Self::Native => PresentationStyle::Inline,
            Self::Interstitial | Self::AppOpen => PresentationStyle::Overlay,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Banner => "banner",
            Self::Native => "native",
            Self::Interstitial => "interstitial",
            Self::AppOpen => "app_open",
        }
    }
}

impl std::fmt::Display for AdFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a slot's creative is presented.
///
/// Inline slots are co-displayed with other content and refresh themselves;
/// overlay slots take over the screen and are frequency capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentationStyle {
    Inline,
    Overlay,
}

impl PresentationStyle {
    /// Formats a slot of this style accepts.
    pub fn formats(&self) -> &'static [AdFormat] {
        match self {
            Self::Inline => &[AdFormat::Banner, AdFormat::Native],
            Self::Overlay => &[AdFormat::Interstitial, AdFormat::AppOpen],
        }
    }

    pub fn accepts(&self, format: AdFormat) -> bool {
        self.formats().contains(&format)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Overlay => "overlay",
        }
    }
}

impl std::fmt::Display for PresentationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_partition_formats() {
        for format in AdFormat::ALL {
            let style = format.style();
            assert!(style.accepts(format), "{format} should belong to {style}");
        }
        assert!(!PresentationStyle::Inline.accepts(AdFormat::Interstitial));
        assert!(!PresentationStyle::Overlay.accepts(AdFormat::Native));
    }

    #[test]
    fn overlay_formats_are_interstitial_and_app_open() {
        assert_eq!(
            PresentationStyle::Overlay.formats(),
            &[AdFormat::Interstitial, AdFormat::AppOpen]
        );
    }

    #[test]
    fn format_serializes_snake_case() {
        insta::assert_json_snapshot!(AdFormat::ALL, @r#"
        [
          "banner",
          "native",
          "interstitial",
          "app_open"
        ]
        "#);
    }

    #[test]
    fn format_deserializes_snake_case() {
        assert_eq!(
            serde_json::from_str::<AdFormat>("\"app_open\"").unwrap(),
            AdFormat::AppOpen
        );
    }
}
