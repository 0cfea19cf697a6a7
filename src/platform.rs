//! Platform detection.
//!
//! Which delivery path a build uses is decided once, at startup, from the
//! configured choice and the target the binary was built for.

use serde::{Deserialize, Serialize};

/// Platform family relevant to document delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Desktop or web-like environment: documents land in the downloads folder.
    Browser,
    /// Handheld device: documents go through the system share sheet.
    Native,
}

/// Configured platform, `auto` meaning "detect".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PlatformChoice {
    /// Detect from the build target.
    #[default]
    Auto,
    /// Force the download path.
    Browser,
    /// Force the share-sheet path.
    Native,
}

impl Platform {
    /// Platform of the running build.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(any(target_os = "android", target_os = "ios")) {
            Self::Native
        } else {
            Self::Browser
        }
    }

    /// Resolve a configured choice.
    #[must_use]
    pub fn resolve(choice: PlatformChoice) -> Self {
        match choice {
            PlatformChoice::Auto => Self::detect(),
            PlatformChoice::Browser => Self::Browser,
            PlatformChoice::Native => Self::Native,
        }
    }

    /// Whether documents are handed to a share sheet.
    #[must_use]
    pub fn is_native(self) -> bool {
        self == Self::Native
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
            Self::Native => write!(f, "native"),
        }
    }
}
