//! Scan event sources.
//!
//! A source owns the capture device while it runs and pushes
//! [`SourceMessage`]s into the channel it was started with. Frames without a
//! code never produce a message; an unrecoverable failure produces exactly one
//! [`SourceMessage::Fatal`] and ends the stream.
//!
//! Two sources ship with the crate:
//!
//! - [`LineSource`]: reads codes line by line from any async reader. Handheld
//!   keyboard-wedge scanners type the decoded text followed by Enter, so
//!   `LineSource::stdin()` is a working scanner on a terminal.
//! - [`ScriptedSource`]: replays a timed script of decodes and faults, used to
//!   exercise sessions without hardware.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::event::{ScanEvent, ScanFault, SourceMessage};

/// Error starting or stopping a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// `start` was called while the source is running.
    #[error("scan source already running")]
    AlreadyRunning,

    /// The source cannot be started again (its input was consumed).
    #[error("scan source exhausted: {0}")]
    Exhausted(&'static str),

    /// The device could not be acquired.
    #[error(transparent)]
    Fault(#[from] ScanFault),
}

/// Capability that turns a capture device into decode events.
#[async_trait]
pub trait ScanEventSource: Send {
    /// Acquire the device and begin emitting messages into `sink`.
    ///
    /// Returns once capture is running. A device or permission failure is
    /// reported as [`SourceError::Fault`].
    async fn start(&mut self, sink: UnboundedSender<SourceMessage>) -> Result<(), SourceError>;

    /// Release the device.
    ///
    /// Idempotent: safe before `start`, after a previous `stop`, and after the
    /// source ended on its own. The device is free when this returns.
    async fn stop(&mut self) -> Result<(), SourceError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Shared view of a source's device ownership, for tests and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    running: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl SourceProbe {
    /// Whether the device is currently held.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of successful starts.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls, including redundant ones.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn started(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn released(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wall-clock timestamps that never go backwards within a session.
///
/// Anchored to the wall clock once, then advanced by a monotonic [`Instant`],
/// so a system clock step cannot make one decode look older than the last.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl SessionClock {
    /// Anchor a clock at the current wall time.
    #[must_use]
    pub fn start() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor a clock at `anchor`.
    #[must_use]
    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }

    /// Anchor plus the monotonic time elapsed since the clock started.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::zero());
        self.anchor + elapsed
    }
}

/// Source reading one code per line from an async reader.
///
/// Blank lines are decode noise and are skipped. A read error is reported
/// as a fatal fault. End of input ends the stream. Events are stamped by a
/// [`SessionClock`] anchored when the source starts.
pub struct LineSource<R> {
    reader: Option<R>,
    task: Option<JoinHandle<()>>,
    probe: SourceProbe,
    name: String,
}

impl LineSource<BufReader<tokio::io::Stdin>> {
    /// Read codes typed (or wedged) on standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin())).with_name("stdin")
    }
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Wrap a buffered reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            task: None,
            probe: SourceProbe::default(),
            name: "lines".to_string(),
        }
    }

    /// Set the name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Probe observing this source.
    #[must_use]
    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl<R> ScanEventSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn start(&mut self, sink: UnboundedSender<SourceMessage>) -> Result<(), SourceError> {
        if self.task.is_some() {
            return Err(SourceError::AlreadyRunning);
        }
        let reader = self
            .reader
            .take()
            .ok_or(SourceError::Exhausted("input already consumed"))?;

        let name = self.name.clone();
        let clock = SessionClock::start();
        self.task = Some(tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let payload = line.trim();
                        if payload.is_empty() {
                            continue;
                        }
                        if sink
                            .send(SourceMessage::Decoded(ScanEvent::new(payload, clock.now())))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(None) => {
                        log::debug!("Source {} reached end of input", name);
                        break;
                    }
                    Err(e) => {
                        let _ = sink.send(SourceMessage::Fatal(ScanFault::Source(e.to_string())));
                        break;
                    }
                }
            }
        }));
        self.probe.started();
        log::debug!("Source {} started", self.name);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SourceError> {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            log::debug!("Source {} released", self.name);
        }
        self.probe.released();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One step of a [`ScriptedSource`] script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// A decode `offset` after the script's base time.
    Decode {
        /// Decoded payload.
        payload: String,
        /// Offset of the decode from the base time.
        offset: Duration,
    },
    /// The device fails.
    Fault(ScanFault),
}

impl ScriptStep {
    /// Decode step at `offset_ms` milliseconds.
    #[must_use]
    pub fn decode(payload: impl Into<String>, offset_ms: u64) -> Self {
        Self::Decode {
            payload: payload.into(),
            offset: Duration::from_millis(offset_ms),
        }
    }
}

/// Source replaying a fixed script.
///
/// Timestamps are `base + offset`, so cooldown behavior is deterministic. In
/// realtime mode the replay also sleeps between steps.
pub struct ScriptedSource {
    steps: Vec<ScriptStep>,
    base: DateTime<Utc>,
    realtime: bool,
    hold_open: bool,
    refuse_with: Option<ScanFault>,
    task: Option<JoinHandle<()>>,
    probe: SourceProbe,
}

impl ScriptedSource {
    /// Script starting at the current time.
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            base: Utc::now(),
            realtime: false,
            hold_open: false,
            refuse_with: None,
            task: None,
            probe: SourceProbe::default(),
        }
    }

    /// Script of decodes at the given millisecond offsets.
    #[must_use]
    pub fn from_decodes<S: Into<String>>(decodes: impl IntoIterator<Item = (S, u64)>) -> Self {
        Self::new(
            decodes
                .into_iter()
                .map(|(payload, ms)| ScriptStep::decode(payload, ms))
                .collect(),
        )
    }

    /// Set the base timestamp.
    #[must_use]
    pub fn with_base(mut self, base: DateTime<Utc>) -> Self {
        self.base = base;
        self
    }

    /// Sleep between steps according to their offsets.
    #[must_use]
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Keep the stream open after the last step until stopped,
    /// like a camera that stays on with nothing in frame.
    #[must_use]
    pub fn hold_open(mut self, hold_open: bool) -> Self {
        self.hold_open = hold_open;
        self
    }

    /// Fail `start` with the given fault, as a denied permission would.
    #[must_use]
    pub fn refuse_start(mut self, fault: ScanFault) -> Self {
        self.refuse_with = Some(fault);
        self
    }

    /// Probe observing this source.
    #[must_use]
    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl ScanEventSource for ScriptedSource {
    async fn start(&mut self, sink: UnboundedSender<SourceMessage>) -> Result<(), SourceError> {
        if self.task.is_some() {
            return Err(SourceError::AlreadyRunning);
        }
        if let Some(fault) = self.refuse_with.clone() {
            return Err(SourceError::Fault(fault));
        }

        let steps = self.steps.clone();
        let base = self.base;
        let realtime = self.realtime;
        let hold_open = self.hold_open;

        self.task = Some(tokio::spawn(async move {
            let mut elapsed = Duration::ZERO;
            for step in steps {
                let message = match step {
                    ScriptStep::Decode { payload, offset } => {
                        if realtime && offset > elapsed {
                            tokio::time::sleep(offset - elapsed).await;
                            elapsed = offset;
                        }
                        let at = base
                            + TimeDelta::from_std(offset).unwrap_or_else(|_| TimeDelta::zero());
                        SourceMessage::Decoded(ScanEvent::new(payload, at))
                    }
                    ScriptStep::Fault(fault) => SourceMessage::Fatal(fault),
                };
                let fatal = matches!(message, SourceMessage::Fatal(_));
                if sink.send(message).is_err() || fatal {
                    return;
                }
            }
            if hold_open {
                sink.closed().await;
            }
        }));
        self.probe.started();
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SourceError> {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.probe.released();
        Ok(())
    }

    fn name(&self) -> &str {
        "script"
    }
}
