//! Audible and haptic scan feedback.
//!
//! Feedback is best effort. The [`FeedbackEmitter`] tries its primary tone,
//! falls back to a minimal tone that is always available, and if that fails
//! too it logs and moves on. Nothing here returns an error to the scan
//! session, and nothing waits for a sound to finish playing.
//!
//! Tones are warmed up when the scanner opens ([`FeedbackEmitter::warm_up`]),
//! not at construction, so the first accepted code does not pay for
//! initialization.

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use thiserror::Error;

use crate::scan::ScanDecision;

/// Volume used for cooldown rejections.
pub const ATTENUATED_VOLUME: f32 = 0.3;

/// Default haptic pulse for an accepted code.
pub const DEFAULT_HAPTIC_PULSE: Duration = Duration::from_millis(30);

/// Error raised inside a feedback strategy. Never leaves this module's
/// emitter.
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// The strategy cannot play on this platform.
    #[error("{0} unavailable")]
    Unavailable(&'static str),

    /// Launching or writing the tone failed.
    #[error("{what} failed: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Kind of feedback to give.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    /// Code captured: full tone plus haptic pulse.
    Accepted,
    /// Cooldown rejection: attenuated tone, no haptic.
    Rejected,
}

impl FeedbackKind {
    /// Feedback for a controller decision, if any.
    ///
    /// Same-session duplicates and dropped events get none.
    #[must_use]
    pub fn for_decision(decision: &ScanDecision) -> Option<Self> {
        match decision {
            ScanDecision::Accepted { .. } => Some(Self::Accepted),
            ScanDecision::CoolingDown => Some(Self::Rejected),
            ScanDecision::Duplicate | ScanDecision::Finalizing | ScanDecision::Inactive => None,
        }
    }
}

/// A way of producing a short tone.
pub trait ToneStrategy: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Prepare resources ahead of the first tone.
    fn warm_up(&mut self) -> Result<(), FeedbackError> {
        Ok(())
    }

    /// Start playing a tone at `volume` (0.0 to 1.0). Must not block until
    /// the tone ends.
    fn play(&mut self, volume: f32) -> Result<(), FeedbackError>;
}

/// A way of producing a short vibration.
pub trait Haptics: Send {
    /// Vibrate for `duration`.
    fn pulse(&mut self, duration: Duration) -> Result<(), FeedbackError>;
}

/// Plays a sound asset through an external player command,
/// e.g. `["paplay", "/usr/share/sounds/scanner-beep.oga"]`.
///
/// The requested volume is exported to the command as `WMSCAN_TONE_VOLUME`.
#[derive(Debug)]
pub struct CommandTone {
    argv: Vec<String>,
    children: Vec<Child>,
}

impl CommandTone {
    /// Player command and its arguments.
    #[must_use]
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            children: Vec::new(),
        }
    }

    fn reap(&mut self) {
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

impl ToneStrategy for CommandTone {
    fn name(&self) -> &'static str {
        "command tone"
    }

    fn warm_up(&mut self) -> Result<(), FeedbackError> {
        if self.argv.is_empty() {
            return Err(FeedbackError::Unavailable("command tone"));
        }
        Ok(())
    }

    fn play(&mut self, volume: f32) -> Result<(), FeedbackError> {
        self.reap();
        let (program, args) = self
            .argv
            .split_first()
            .ok_or(FeedbackError::Unavailable("command tone"))?;
        let child = Command::new(program)
            .args(args)
            .env("WMSCAN_TONE_VOLUME", format!("{volume:.2}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| FeedbackError::Io {
                what: "tone command",
                source,
            })?;
        self.children.push(child);
        Ok(())
    }
}

/// Terminal bell. The guaranteed fallback: one byte to a writer.
pub struct BellTone<W: Write + Send> {
    out: W,
}

impl BellTone<std::io::Stderr> {
    /// Bell on standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> BellTone<W> {
    /// Bell on an arbitrary writer.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> ToneStrategy for BellTone<W> {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn play(&mut self, _volume: f32) -> Result<(), FeedbackError> {
        self.out
            .write_all(b"\x07")
            .and_then(|()| self.out.flush())
            .map_err(|source| FeedbackError::Io {
                what: "bell",
                source,
            })
    }
}

/// Haptics for devices without a vibration motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn pulse(&mut self, _duration: Duration) -> Result<(), FeedbackError> {
        Err(FeedbackError::Unavailable("haptics"))
    }
}

/// Gives feedback for scan decisions without ever failing the caller.
pub struct FeedbackEmitter {
    primary: Option<Box<dyn ToneStrategy>>,
    fallback: Box<dyn ToneStrategy>,
    haptics: Box<dyn Haptics>,
    haptic_pulse: Duration,
    rejection_tone: bool,
    enabled: bool,
    warmed: bool,
}

impl std::fmt::Debug for FeedbackEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackEmitter")
            .field("primary", &self.primary.as_ref().map(|t| t.name()))
            .field("fallback", &self.fallback.name())
            .field("haptic_pulse", &self.haptic_pulse)
            .field("rejection_tone", &self.rejection_tone)
            .field("enabled", &self.enabled)
            .field("warmed", &self.warmed)
            .finish()
    }
}

impl Default for FeedbackEmitter {
    fn default() -> Self {
        Self::new(None, Box::new(BellTone::stderr()), Box::new(NoHaptics))
    }
}

impl FeedbackEmitter {
    /// Emitter with an optional primary tone, a fallback tone and haptics.
    #[must_use]
    pub fn new(
        primary: Option<Box<dyn ToneStrategy>>,
        fallback: Box<dyn ToneStrategy>,
        haptics: Box<dyn Haptics>,
    ) -> Self {
        Self {
            primary,
            fallback,
            haptics,
            haptic_pulse: DEFAULT_HAPTIC_PULSE,
            rejection_tone: false,
            enabled: true,
            warmed: false,
        }
    }

    /// Emitter that never makes a sound.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default().with_enabled(false)
    }

    /// Turn all feedback on or off.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Play an attenuated tone on cooldown rejections.
    #[must_use]
    pub fn with_rejection_tone(mut self, enabled: bool) -> Self {
        self.rejection_tone = enabled;
        self
    }

    /// Length of the haptic pulse on acceptance.
    #[must_use]
    pub fn with_haptic_pulse(mut self, pulse: Duration) -> Self {
        self.haptic_pulse = pulse;
        self
    }

    /// Whether [`warm_up`](Self::warm_up) has run.
    #[must_use]
    pub fn is_warmed(&self) -> bool {
        self.warmed
    }

    /// Prepare tones. Call when the scanner is opened.
    ///
    /// A primary tone that fails to warm up is dropped so later tones go
    /// straight to the fallback.
    pub fn warm_up(&mut self) {
        if self.warmed || !self.enabled {
            return;
        }
        if let Some(primary) = self.primary.as_mut() {
            if let Err(e) = primary.warm_up() {
                log::warn!("Tone {} unavailable, using fallback: {}", primary.name(), e);
                self.primary = None;
            }
        }
        if let Err(e) = self.fallback.warm_up() {
            log::warn!("Fallback tone {} warm-up failed: {}", self.fallback.name(), e);
        }
        self.warmed = true;
    }

    /// Feedback for a controller decision.
    pub fn emit(&mut self, decision: &ScanDecision) {
        if let Some(kind) = FeedbackKind::for_decision(decision) {
            self.give(kind);
        }
    }

    /// Give one kind of feedback.
    pub fn give(&mut self, kind: FeedbackKind) {
        if !self.enabled {
            return;
        }
        if !self.warmed {
            self.warm_up();
        }
        match kind {
            FeedbackKind::Accepted => {
                self.tone(1.0);
                if let Err(e) = self.haptics.pulse(self.haptic_pulse) {
                    log::trace!("Haptic pulse skipped: {}", e);
                }
            }
            FeedbackKind::Rejected => {
                if self.rejection_tone {
                    self.tone(ATTENUATED_VOLUME);
                }
            }
        }
    }

    fn tone(&mut self, volume: f32) {
        if let Some(primary) = self.primary.as_mut() {
            match primary.play(volume) {
                Ok(()) => return,
                Err(e) => log::warn!("Tone {} failed, using fallback: {}", primary.name(), e),
            }
        }
        if let Err(e) = self.fallback.play(volume) {
            log::error!("Fallback tone {} failed: {}", self.fallback.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct RecordingTone {
        label: &'static str,
        fail_play: bool,
        fail_warm: bool,
        rec: Recorder,
    }

    impl ToneStrategy for RecordingTone {
        fn name(&self) -> &'static str {
            self.label
        }

        fn warm_up(&mut self) -> Result<(), FeedbackError> {
            self.rec.calls.lock().unwrap().push(format!("{}:warm", self.label));
            if self.fail_warm {
                return Err(FeedbackError::Unavailable("test"));
            }
            Ok(())
        }

        fn play(&mut self, volume: f32) -> Result<(), FeedbackError> {
            if self.fail_play {
                return Err(FeedbackError::Unavailable("test"));
            }
            self.rec
                .calls
                .lock()
                .unwrap()
                .push(format!("{}:{:.1}", self.label, volume));
            Ok(())
        }
    }

    struct RecordingHaptics(Recorder);

    impl Haptics for RecordingHaptics {
        fn pulse(&mut self, duration: Duration) -> Result<(), FeedbackError> {
            self.0
                .calls
                .lock()
                .unwrap()
                .push(format!("haptic:{}", duration.as_millis()));
            Ok(())
        }
    }

    fn emitter(rec: &Recorder, fail_play: bool, fail_warm: bool) -> FeedbackEmitter {
        FeedbackEmitter::new(
            Some(Box::new(RecordingTone {
                label: "primary",
                fail_play,
                fail_warm,
                rec: rec.clone(),
            })),
            Box::new(RecordingTone {
                label: "fallback",
                fail_play: false,
                fail_warm: false,
                rec: rec.clone(),
            }),
            Box::new(RecordingHaptics(rec.clone())),
        )
    }

    fn accepted() -> ScanDecision {
        ScanDecision::Accepted {
            payload: "A".into(),
            completes_session: false,
        }
    }

    #[test]
    fn test_accepted_plays_tone_and_haptic() {
        let rec = Recorder::default();
        let mut fb = emitter(&rec, false, false);
        fb.warm_up();
        fb.emit(&accepted());
        assert_eq!(
            rec.calls(),
            vec!["primary:warm", "fallback:warm", "primary:1.0", "haptic:30"]
        );
    }

    #[test]
    fn test_primary_failure_falls_back() {
        let rec = Recorder::default();
        let mut fb = emitter(&rec, true, false);
        fb.warm_up();
        fb.emit(&accepted());
        assert!(rec.calls().contains(&"fallback:1.0".to_string()));
    }

    #[test]
    fn test_failed_warm_up_drops_primary() {
        let rec = Recorder::default();
        let mut fb = emitter(&rec, false, true);
        fb.warm_up();
        fb.emit(&accepted());
        let calls = rec.calls();
        assert!(!calls.contains(&"primary:1.0".to_string()));
        assert!(calls.contains(&"fallback:1.0".to_string()));
    }

    #[test]
    fn test_duplicate_gets_no_feedback() {
        let rec = Recorder::default();
        let mut fb = emitter(&rec, false, false).with_rejection_tone(true);
        fb.warm_up();
        fb.emit(&ScanDecision::Duplicate);
        fb.emit(&ScanDecision::Inactive);
        assert_eq!(rec.calls(), vec!["primary:warm", "fallback:warm"]);
    }

    #[test]
    fn test_cooldown_rejection_is_attenuated_without_haptic() {
        let rec = Recorder::default();
        let mut fb = emitter(&rec, false, false).with_rejection_tone(true);
        fb.warm_up();
        fb.emit(&ScanDecision::CoolingDown);
        assert_eq!(
            rec.calls(),
            vec!["primary:warm", "fallback:warm", "primary:0.3"]
        );
    }

    #[test]
    fn test_rejection_tone_off_by_default() {
        let rec = Recorder::default();
        let mut fb = emitter(&rec, false, false);
        fb.emit(&ScanDecision::CoolingDown);
        assert!(!rec.calls().iter().any(|c| c.starts_with("primary:0")));
    }

    #[test]
    fn test_disabled_emitter_is_silent() {
        let rec = Recorder::default();
        let mut fb = emitter(&rec, false, false).with_enabled(false);
        fb.warm_up();
        fb.emit(&accepted());
        assert!(rec.calls().is_empty());
        assert!(!fb.is_warmed());
    }

    #[test]
    fn test_bell_writes_bel() {
        let mut buf = Vec::new();
        BellTone::new(&mut buf).play(1.0).unwrap();
        assert_eq!(buf, b"\x07");
    }

    #[test]
    fn test_command_tone_missing_program_errors() {
        let mut tone = CommandTone::new(vec!["/nonexistent/wmscan-player".into()]);
        assert!(tone.warm_up().is_ok());
        assert!(matches!(
            tone.play(1.0),
            Err(FeedbackError::Io { .. })
        ));
        assert!(CommandTone::new(Vec::new()).warm_up().is_err());
    }
}
