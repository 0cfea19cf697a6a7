//! Scan session state machine.
//!
//! # Overview
//!
//! A [`ScanSessionController`] owns exactly one [`ScanSession`] and decides,
//! for every decode event, whether the payload is captured:
//!
//! - **Single** mode: the first event wins. A guard flag set before anything
//!   else drops the near-simultaneous second read of the same physical code.
//! - **Multiple** mode: payloads already captured are ignored silently; a
//!   repeat of the most recently accepted payload inside the cooldown window
//!   is rejected; anything else is appended in decode order.
//!
//! ```text
//!   Active ──(single capture / stop request)──▶ Closing ──(source released)──▶ Closed
//!     │                                                                         ▲
//!     └──────────────────────────(fatal source fault)────────────────────────────┘
//! ```
//!
//! All of the session state is held in one owned value and updated
//! synchronously per event, so the duplicate check and the cooldown check
//! always see the result of the previous acceptance.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use wmscan::scan::{CaptureMode, ScanDecision, ScanEvent, ScanSessionController, SessionPolicy};
//!
//! let mut controller = ScanSessionController::new(CaptureMode::Multiple, SessionPolicy::default());
//! let t0 = Utc::now();
//!
//! assert!(controller.handle_event(&ScanEvent::new("UDM001", t0)).is_accepted());
//! assert_eq!(
//!     controller.handle_event(&ScanEvent::new("UDM001", t0 + Duration::milliseconds(400))),
//!     ScanDecision::Duplicate
//! );
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::event::{CaptureMode, ScanEvent};

/// Cooldown applied to re-reads of the last accepted code.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

/// Lifecycle of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Accepting decode events.
    Active,
    /// Capture finished or stop requested; the source is being released.
    Closing,
    /// Terminal. The camera belongs to the platform again.
    Closed,
}

/// What the cooldown window is keyed on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CooldownKeying {
    /// Only a re-read of the last accepted payload is throttled.
    /// A different code right after is accepted immediately.
    #[default]
    PerPayload,
    /// Every event inside the window after an acceptance is rejected,
    /// whatever its payload.
    Global,
}

/// Acceptance policy knobs for Multiple mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Window during which a repeat read is rejected.
    pub cooldown: Duration,
    /// What the window is keyed on.
    pub keying: CooldownKeying,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            keying: CooldownKeying::PerPayload,
        }
    }
}

impl SessionPolicy {
    /// Set the cooldown window.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the cooldown keying.
    #[must_use]
    pub fn with_keying(mut self, keying: CooldownKeying) -> Self {
        self.keying = keying;
        self
    }

    fn window(&self) -> TimeDelta {
        TimeDelta::from_std(self.cooldown).unwrap_or_else(|_| TimeDelta::max_value())
    }
}

/// Outcome of feeding one event to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDecision {
    /// The payload was captured.
    Accepted {
        /// The captured payload.
        payload: String,
        /// True when this capture completes the session (Single mode).
        completes_session: bool,
    },
    /// Already captured in this session. No feedback, cooldown clock untouched.
    Duplicate,
    /// Rejected by the cooldown window.
    CoolingDown,
    /// A Single-mode capture is already being finalized.
    Finalizing,
    /// The session is no longer active; late events are dropped.
    Inactive,
}

impl ScanDecision {
    /// Whether the payload was captured.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Whether this decision ends the session.
    #[must_use]
    pub fn completes_session(&self) -> bool {
        matches!(
            self,
            Self::Accepted {
                completes_session: true,
                ..
            }
        )
    }
}

/// Codes handed to the caller when a session completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScanResult {
    /// The one code of a Single-mode session.
    Single(String),
    /// Codes of a Multiple-mode session, in decode order.
    Multiple(Vec<String>),
}

impl ScanResult {
    /// Captured codes as a slice-like vector, whatever the mode.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        match self {
            Self::Single(code) => vec![code.as_str()],
            Self::Multiple(codes) => codes.iter().map(String::as_str).collect(),
        }
    }

    /// Number of captured codes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(codes) => codes.len(),
        }
    }

    /// True for a Multiple-mode result with nothing captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State of one scan session, owned by its controller.
#[derive(Debug, Clone)]
pub struct ScanSession {
    mode: CaptureMode,
    accepted_codes: Vec<String>,
    last_accepted_payload: Option<String>,
    last_accepted_at: Option<DateTime<Utc>>,
    state: SessionState,
}

impl ScanSession {
    fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            accepted_codes: Vec::new(),
            last_accepted_payload: None,
            last_accepted_at: None,
            state: SessionState::Active,
        }
    }

    /// Capture mode of this session.
    #[must_use]
    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Accepted codes so far, in decode order.
    #[must_use]
    pub fn accepted_codes(&self) -> &[String] {
        &self.accepted_codes
    }

    /// Payload of the most recent acceptance.
    #[must_use]
    pub fn last_accepted_payload(&self) -> Option<&str> {
        self.last_accepted_payload.as_deref()
    }

    /// Timestamp of the most recent acceptance.
    #[must_use]
    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.last_accepted_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn accept(&mut self, event: &ScanEvent) {
        self.accepted_codes.push(event.payload.clone());
        self.last_accepted_payload = Some(event.payload.clone());
        self.last_accepted_at = Some(event.observed_at);
    }
}

/// Decides acceptance of decode events for one session.
#[derive(Debug)]
pub struct ScanSessionController {
    session: ScanSession,
    policy: SessionPolicy,
    finalizing: bool,
}

impl ScanSessionController {
    /// Open a new session in the `Active` state.
    #[must_use]
    pub fn new(mode: CaptureMode, policy: SessionPolicy) -> Self {
        log::debug!(
            "Scan session opened: mode={}, cooldown={:?}, keying={:?}",
            mode,
            policy.cooldown,
            policy.keying
        );
        Self {
            session: ScanSession::new(mode),
            policy,
            finalizing: false,
        }
    }

    /// Read-only view of the session.
    #[must_use]
    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Capture mode of the session.
    #[must_use]
    pub fn mode(&self) -> CaptureMode {
        self.session.mode
    }

    /// Acceptance policy in force.
    #[must_use]
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Process one decode event.
    pub fn handle_event(&mut self, event: &ScanEvent) -> ScanDecision {
        if self.session.state != SessionState::Active {
            if self.finalizing && self.session.state == SessionState::Closing {
                log::debug!("Ignored {:?}: capture already finalizing", event.payload);
                return ScanDecision::Finalizing;
            }
            log::trace!("Dropped late scan {:?}: session not active", event.payload);
            return ScanDecision::Inactive;
        }

        let decision = match self.session.mode {
            CaptureMode::Single => self.handle_single(event),
            CaptureMode::Multiple => self.handle_multiple(event),
        };

        match &decision {
            ScanDecision::Accepted { payload, .. } => {
                log::info!(
                    "Accepted code {:?} ({} captured)",
                    payload,
                    self.session.accepted_codes.len()
                );
            }
            ScanDecision::Duplicate => {
                log::debug!("Ignored {:?}: already captured", event.payload);
            }
            ScanDecision::CoolingDown => {
                log::debug!(
                    "Ignored {:?}: inside {:?} cooldown",
                    event.payload,
                    self.policy.cooldown
                );
            }
            ScanDecision::Finalizing | ScanDecision::Inactive => {}
        }

        decision
    }

    fn handle_single(&mut self, event: &ScanEvent) -> ScanDecision {
        if self.finalizing {
            return ScanDecision::Finalizing;
        }
        self.finalizing = true;
        self.session.accept(event);
        self.session.state = SessionState::Closing;
        ScanDecision::Accepted {
            payload: event.payload.clone(),
            completes_session: true,
        }
    }

    fn handle_multiple(&mut self, event: &ScanEvent) -> ScanDecision {
        if self.session.accepted_codes.contains(&event.payload) {
            return ScanDecision::Duplicate;
        }

        if self.in_cooldown(event) {
            return ScanDecision::CoolingDown;
        }

        self.session.accept(event);
        ScanDecision::Accepted {
            payload: event.payload.clone(),
            completes_session: false,
        }
    }

    fn in_cooldown(&self, event: &ScanEvent) -> bool {
        let Some(last_at) = self.session.last_accepted_at else {
            return false;
        };
        let keyed = match self.policy.keying {
            CooldownKeying::PerPayload => {
                self.session.last_accepted_payload.as_deref() == Some(event.payload.as_str())
            }
            CooldownKeying::Global => true,
        };
        keyed && event.observed_at - last_at < self.policy.window()
    }

    /// Explicit stop by the operator.
    ///
    /// Moves an `Active` session to `Closing` and returns what the caller
    /// should receive: the full code list in Multiple mode, nothing in Single
    /// mode (closing a single-capture scanner is a cancellation). Any other
    /// state is left as is and `None` is returned, so repeated calls are
    /// harmless.
    pub fn request_stop(&mut self) -> Option<ScanResult> {
        if self.session.state != SessionState::Active {
            return None;
        }
        self.session.state = SessionState::Closing;
        log::debug!(
            "Stop requested with {} code(s) captured",
            self.session.accepted_codes.len()
        );
        match self.session.mode {
            CaptureMode::Single => None,
            CaptureMode::Multiple => Some(ScanResult::Multiple(self.snapshot())),
        }
    }

    /// Result of a completed Single-mode capture.
    #[must_use]
    pub fn single_result(&self) -> Option<ScanResult> {
        match self.session.mode {
            CaptureMode::Single => self
                .session
                .accepted_codes
                .first()
                .cloned()
                .map(ScanResult::Single),
            CaptureMode::Multiple => None,
        }
    }

    /// Mark the session `Closed` once the source has been released.
    pub fn finish(&mut self) {
        if self.session.state != SessionState::Closed {
            self.session.state = SessionState::Closed;
            log::debug!("Scan session closed");
        }
    }

    /// Fatal source fault: straight to `Closed` from any state.
    pub fn fail(&mut self) {
        self.finalizing = true;
        self.session.state = SessionState::Closed;
    }

    /// Copy of the accepted codes. Mutating it has no effect on the session.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.session.accepted_codes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn multiple() -> ScanSessionController {
        ScanSessionController::new(CaptureMode::Multiple, SessionPolicy::default())
    }

    #[test]
    fn test_single_first_event_completes() {
        let mut c = ScanSessionController::new(CaptureMode::Single, SessionPolicy::default());
        let decision = c.handle_event(&ScanEvent::new("LOC-12", at(0)));
        assert!(decision.completes_session());
        assert_eq!(c.state(), SessionState::Closing);
        assert_eq!(c.single_result(), Some(ScanResult::Single("LOC-12".into())));
    }

    #[test]
    fn test_single_second_event_is_dropped() {
        let mut c = ScanSessionController::new(CaptureMode::Single, SessionPolicy::default());
        c.handle_event(&ScanEvent::new("LOC-12", at(0)));
        assert_eq!(
            c.handle_event(&ScanEvent::new("LOC-12", at(1))),
            ScanDecision::Finalizing
        );
        assert_eq!(
            c.handle_event(&ScanEvent::new("LOC-13", at(2))),
            ScanDecision::Finalizing
        );
        c.finish();
        assert_eq!(
            c.handle_event(&ScanEvent::new("LOC-14", at(3))),
            ScanDecision::Inactive
        );
        assert_eq!(c.session().accepted_codes(), ["LOC-12"]);
    }

    #[test]
    fn test_multiple_distinct_codes_no_delay() {
        let mut c = multiple();
        assert!(c.handle_event(&ScanEvent::new("A", at(0))).is_accepted());
        assert!(c.handle_event(&ScanEvent::new("B", at(10))).is_accepted());
        assert_eq!(c.session().accepted_codes(), ["A", "B"]);
    }

    #[test]
    fn test_multiple_duplicate_does_not_touch_clock() {
        let mut c = multiple();
        c.handle_event(&ScanEvent::new("A", at(0)));
        c.handle_event(&ScanEvent::new("B", at(100)));
        assert_eq!(
            c.handle_event(&ScanEvent::new("A", at(2000))),
            ScanDecision::Duplicate
        );
        assert_eq!(c.session().last_accepted_payload(), Some("B"));
        assert_eq!(c.session().last_accepted_at(), Some(at(100)));
    }

    #[test]
    fn test_global_keying_throttles_other_codes() {
        let policy = SessionPolicy::default().with_keying(CooldownKeying::Global);
        let mut c = ScanSessionController::new(CaptureMode::Multiple, policy);
        c.handle_event(&ScanEvent::new("A", at(0)));
        assert_eq!(
            c.handle_event(&ScanEvent::new("B", at(10))),
            ScanDecision::CoolingDown
        );
        assert!(c.handle_event(&ScanEvent::new("B", at(500))).is_accepted());
    }

    #[test]
    fn test_request_stop_is_idempotent() {
        let mut c = multiple();
        c.handle_event(&ScanEvent::new("A", at(0)));
        assert_eq!(
            c.request_stop(),
            Some(ScanResult::Multiple(vec!["A".into()]))
        );
        assert_eq!(c.request_stop(), None);
        c.finish();
        c.finish();
        assert_eq!(c.state(), SessionState::Closed);
        assert_eq!(
            c.handle_event(&ScanEvent::new("B", at(10))),
            ScanDecision::Inactive
        );
    }

    #[test]
    fn test_single_stop_without_capture_yields_nothing() {
        let mut c = ScanSessionController::new(CaptureMode::Single, SessionPolicy::default());
        assert_eq!(c.request_stop(), None);
        assert_eq!(c.state(), SessionState::Closing);
        assert_eq!(c.single_result(), None);
    }

    #[test]
    fn test_fail_closes_from_active() {
        let mut c = multiple();
        c.fail();
        assert_eq!(c.state(), SessionState::Closed);
        assert_eq!(c.request_stop(), None);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut c = multiple();
        c.handle_event(&ScanEvent::new("A", at(0)));
        let mut snap = c.snapshot();
        snap.push("X".into());
        assert_eq!(c.session().accepted_codes(), ["A"]);
    }

    #[test]
    fn test_scan_result_serializes_untagged() {
        let single = serde_json::to_string(&ScanResult::Single("LOC-12".into())).unwrap();
        assert_eq!(single, "\"LOC-12\"");
        let many =
            serde_json::to_string(&ScanResult::Multiple(vec!["A".into(), "B".into()])).unwrap();
        assert_eq!(many, "[\"A\",\"B\"]");
    }
}
