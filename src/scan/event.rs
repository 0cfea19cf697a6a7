//! Raw decode events and the fatal faults a scan source can raise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single successful decode emitted by a scan source.
///
/// Events are ephemeral: the controller consumes them as soon as they arrive
/// and never stores the event itself, only the accepted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// Decoded text of the code, passed through unvalidated.
    pub payload: String,
    /// When the decoder reported the code.
    pub observed_at: DateTime<Utc>,
}

impl ScanEvent {
    /// Create an event observed at the given instant.
    #[must_use]
    pub fn new(payload: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            payload: payload.into(),
            observed_at,
        }
    }

    /// Create an event observed now.
    #[must_use]
    pub fn now(payload: impl Into<String>) -> Self {
        Self::new(payload, Utc::now())
    }
}

/// How many codes a session captures before it completes.
///
/// Fixed for the lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// First accepted code completes the session (location labels).
    #[default]
    Single,
    /// Codes accumulate until the operator stops the session (unit labels).
    Multiple,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiple => write!(f, "multiple"),
        }
    }
}

/// Unrecoverable camera or decoder failure.
///
/// A fault ends the session it occurs in. Retrying means opening a new session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanFault {
    /// The user or the platform refused camera access.
    #[error("camera permission denied")]
    PermissionDenied,

    /// No usable capture device, or it is held by someone else.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The source stopped producing events for another reason.
    #[error("scan source failed: {0}")]
    Source(String),
}

impl ScanFault {
    /// Short message suitable for showing to the operator.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Camera permission denied. Enable it in the app settings."
            }
            Self::DeviceUnavailable(_) => "Unable to access the camera. Check the permissions.",
            Self::Source(_) => "The scanner stopped unexpectedly.",
        }
    }
}

/// Message sent from a running source to the session runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMessage {
    /// A code was decoded.
    Decoded(ScanEvent),
    /// The source cannot continue.
    Fatal(ScanFault),
}
