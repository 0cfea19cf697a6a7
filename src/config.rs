//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config PATH`, else `config.toml` in the platform config dir)
//! 3. Environment variables prefixed `WMSCAN_`, `__` separating sections
//!    (e.g. `WMSCAN_SCAN__COOLDOWN_MS=250`)
//! 4. CLI flags, applied by the caller after loading
//!
//! ```toml
//! [scan]
//! cooldown_ms = 500
//! cooldown_keying = "per_payload"
//!
//! [feedback]
//! tone_command = ["paplay", "/usr/share/sounds/freedesktop/stereo/bell.oga"]
//!
//! [delivery]
//! platform = "auto"
//! share_title = "UDM labels"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::share::{DEFAULT_SHARE_TEXT, DEFAULT_SHARE_TITLE};
use crate::feedback::{BellTone, CommandTone, FeedbackEmitter, NoHaptics, ToneStrategy};
use crate::platform::PlatformChoice;
use crate::scan::{CooldownKeying, SessionPolicy};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "WMSCAN_";

/// Longest cooldown accepted, in milliseconds.
pub const MAX_COOLDOWN_MS: u64 = 10_000;

/// Error loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer could not be read or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid configuration value for {key}: {message}")]
    Value { key: &'static str, message: String },
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scan session policy.
    pub scan: ScanSettings,
    /// Scan feedback.
    pub feedback: FeedbackSettings,
    /// Label delivery.
    pub delivery: DeliverySettings,
}

/// Scan session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Cooldown window in milliseconds.
    pub cooldown_ms: u64,
    /// What the cooldown is keyed on.
    pub cooldown_keying: CooldownKeying,
    /// Allow confirming a Multiple-mode session with no codes.
    pub allow_empty_close: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: 500,
            cooldown_keying: CooldownKeying::PerPayload,
            allow_empty_close: false,
        }
    }
}

impl ScanSettings {
    /// Session policy described by these settings.
    #[must_use]
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy::default()
            .with_cooldown(Duration::from_millis(self.cooldown_ms))
            .with_keying(self.cooldown_keying)
    }
}

/// Feedback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    /// Master switch.
    pub enabled: bool,
    /// Player command for the primary tone. The bell is used without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone_command: Option<Vec<String>>,
    /// Attenuated tone on cooldown rejections.
    pub duplicate_tone: bool,
    /// Haptic pulse length in milliseconds.
    pub haptic_ms: u64,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tone_command: None,
            duplicate_tone: false,
            haptic_ms: 30,
        }
    }
}

impl FeedbackSettings {
    /// Emitter described by these settings.
    #[must_use]
    pub fn build_emitter(&self) -> FeedbackEmitter {
        let primary = self
            .tone_command
            .clone()
            .map(|argv| Box::new(CommandTone::new(argv)) as Box<dyn ToneStrategy>);
        FeedbackEmitter::new(primary, Box::new(BellTone::stderr()), Box::new(NoHaptics))
            .with_enabled(self.enabled)
            .with_rejection_tone(self.duplicate_tone)
            .with_haptic_pulse(Duration::from_millis(self.haptic_ms))
    }
}

/// Delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Delivery path, `auto` to detect.
    pub platform: PlatformChoice,
    /// Download directory for the browser path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads_dir: Option<PathBuf>,
    /// Cache directory for the native path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Share sheet title.
    pub share_title: String,
    /// Share sheet text.
    pub share_text: String,
    /// Opener used as share sheet instead of the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_command: Option<Vec<String>>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            platform: PlatformChoice::Auto,
            downloads_dir: None,
            cache_dir: None,
            share_title: DEFAULT_SHARE_TITLE.to_string(),
            share_text: DEFAULT_SHARE_TEXT.to_string(),
            open_command: None,
        }
    }
}

impl DeliverySettings {
    /// Configured download directory, else the user's downloads folder,
    /// else a folder in the app data dir.
    #[must_use]
    pub fn resolve_downloads_dir(&self) -> Option<PathBuf> {
        self.downloads_dir
            .clone()
            .or_else(|| {
                UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            })
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join("downloads")))
    }

    /// Configured cache directory, else the app cache dir.
    #[must_use]
    pub fn resolve_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.cache_dir().join("labels")))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "wms", "wmscan")
}

impl Config {
    /// Load from the given file, or the default path when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_config_path);
        if let Some(p) = &path {
            log::debug!("Loading configuration from {}", p.display());
        }
        Self::from_figment(Self::figment(path.as_deref()))
    }

    /// Load from a specific TOML file. A missing file yields defaults.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(Some(path.as_ref())))
    }

    /// Figment with defaults, the TOML file (if any) and the environment.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate a configuration.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Default platform-specific configuration path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check value ranges. Run after every layer, CLI flags included.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.cooldown_ms > MAX_COOLDOWN_MS {
            return Err(ConfigError::Value {
                key: "scan.cooldown_ms",
                message: format!("{} exceeds {MAX_COOLDOWN_MS}", self.scan.cooldown_ms),
            });
        }
        if self.feedback.tone_command.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::Value {
                key: "feedback.tone_command",
                message: "must name a program".to_string(),
            });
        }
        Ok(())
    }
}
