//! Drives one scan session from open to close.
//!
//! The [`ScanRunner`] owns the source, the controller and the feedback
//! emitter. Messages from the source are processed one at a time, so each
//! decode sees the state left by the previous one. Stop requests from the UI
//! arrive on a separate channel and win over pending decodes.
//!
//! Whatever way the session ends, the source is stopped before the caller is
//! told, and [`ScanCaller::on_close`] is called exactly once.

use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::controller::{ScanResult, ScanSessionController, SessionPolicy, SessionState};
use super::event::{CaptureMode, ScanFault, SourceMessage};
use super::source::{ScanEventSource, SourceError};
use crate::feedback::FeedbackEmitter;

/// Page-level collaborator receiving the outcome of a session.
pub trait ScanCaller: Send {
    /// Codes captured by a completed session. Called at most once.
    fn on_scan_success(&mut self, result: ScanResult);

    /// A code was added to the live list (Multiple mode progress).
    fn on_code_accepted(&mut self, _code: &str, _total: usize) {}

    /// The session died on a device fault. Called at most once.
    fn on_fatal_error(&mut self, _fault: &ScanFault) {}

    /// The session reached `Closed`. Called exactly once.
    fn on_close(&mut self);
}

/// UI request to end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// "Stop and confirm": hand the captured codes to the caller.
    Confirm,
    /// Close button or teardown: discard the session.
    Cancel,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Codes were handed to the caller.
    Completed(ScanResult),
    /// Closed without a result.
    Cancelled,
    /// Closed by a device fault.
    Faulted(ScanFault),
}

/// Runs one session over a source.
pub struct ScanRunner<S: ScanEventSource> {
    source: S,
    controller: ScanSessionController,
    feedback: FeedbackEmitter,
    allow_empty_close: bool,
}

impl<S: ScanEventSource> std::fmt::Debug for ScanRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRunner")
            .field("source", &self.source.name())
            .field("controller", &self.controller)
            .field("feedback", &self.feedback)
            .field("allow_empty_close", &self.allow_empty_close)
            .finish()
    }
}

impl<S: ScanEventSource> ScanRunner<S> {
    /// Runner for a new session with default (silent) feedback.
    #[must_use]
    pub fn new(source: S, mode: CaptureMode, policy: SessionPolicy) -> Self {
        Self {
            source,
            controller: ScanSessionController::new(mode, policy),
            feedback: FeedbackEmitter::disabled(),
            allow_empty_close: false,
        }
    }

    /// Use the given feedback emitter.
    #[must_use]
    pub fn with_feedback(mut self, feedback: FeedbackEmitter) -> Self {
        self.feedback = feedback;
        self
    }

    /// Let "stop and confirm" close a Multiple-mode session with no codes.
    #[must_use]
    pub fn allow_empty_close(mut self, allow: bool) -> Self {
        self.allow_empty_close = allow;
        self
    }

    /// Controller state, for inspection after [`run`](Self::run).
    #[must_use]
    pub fn controller(&self) -> &ScanSessionController {
        &self.controller
    }

    /// Run the session until it closes.
    ///
    /// Dropping every sender of `stops` counts as [`StopRequest::Cancel`],
    /// which is what happens when the scanner UI is torn down.
    ///
    /// A session runs once. Calling `run` again after it closed returns
    /// [`SessionEnd::Cancelled`] without starting the source or calling the
    /// caller.
    pub async fn run<C: ScanCaller>(
        &mut self,
        caller: &mut C,
        mut stops: UnboundedReceiver<StopRequest>,
    ) -> SessionEnd {
        if self.controller.state() != SessionState::Active {
            log::warn!("Scanner session already {:?}, not reopening", self.controller.state());
            return SessionEnd::Cancelled;
        }

        let mode = self.controller.mode();
        log::info!("Scanner opened ({} mode, source {})", mode, self.source.name());
        self.feedback.warm_up();

        let (tx, mut events) = mpsc::unbounded_channel();
        if let Err(e) = self.source.start(tx).await {
            let fault = match e {
                SourceError::Fault(fault) => fault,
                other => ScanFault::Source(other.to_string()),
            };
            return self.fault(caller, fault).await;
        }

        loop {
            tokio::select! {
                biased;

                request = stops.recv() => {
                    let request = request.unwrap_or(StopRequest::Cancel);
                    if let Some(end) = self.stop(caller, request).await {
                        return end;
                    }
                }

                message = events.recv() => match message {
                    Some(SourceMessage::Decoded(event)) => {
                        let decision = self.controller.handle_event(&event);
                        self.feedback.emit(&decision);
                        if decision.is_accepted() {
                            let codes = self.controller.session().accepted_codes();
                            if let Some(code) = codes.last() {
                                caller.on_code_accepted(code, codes.len());
                            }
                        }
                        if decision.completes_session() {
                            self.release().await;
                            return match self.controller.single_result() {
                                Some(result) => self.complete(caller, result),
                                None => self.cancel(caller),
                            };
                        }
                    }
                    Some(SourceMessage::Fatal(fault)) => {
                        return self.fault(caller, fault).await;
                    }
                    None => {
                        log::debug!("Source {} ended", self.source.name());
                        let request = if self.controller.session().accepted_codes().is_empty() {
                            StopRequest::Cancel
                        } else {
                            StopRequest::Confirm
                        };
                        if let Some(end) = self.stop(caller, request).await {
                            return end;
                        }
                    }
                },
            }
        }
    }

    async fn stop<C: ScanCaller>(
        &mut self,
        caller: &mut C,
        request: StopRequest,
    ) -> Option<SessionEnd> {
        if request == StopRequest::Confirm
            && self.controller.mode() == CaptureMode::Multiple
            && self.controller.session().accepted_codes().is_empty()
            && !self.allow_empty_close
        {
            log::warn!("Stop ignored: no codes captured yet");
            return None;
        }

        let result = self.controller.request_stop();
        self.release().await;
        Some(match (request, result) {
            (StopRequest::Confirm, Some(result)) => self.complete(caller, result),
            _ => self.cancel(caller),
        })
    }

    async fn release(&mut self) {
        if let Err(e) = self.source.stop().await {
            log::error!("Failed to release source {}: {}", self.source.name(), e);
        }
    }

    fn complete<C: ScanCaller>(&mut self, caller: &mut C, result: ScanResult) -> SessionEnd {
        self.controller.finish();
        log::info!("Scanner closed with {} code(s)", result.len());
        caller.on_scan_success(result.clone());
        caller.on_close();
        SessionEnd::Completed(result)
    }

    fn cancel<C: ScanCaller>(&mut self, caller: &mut C) -> SessionEnd {
        self.controller.finish();
        log::info!("Scanner closed without result");
        caller.on_close();
        SessionEnd::Cancelled
    }

    async fn fault<C: ScanCaller>(&mut self, caller: &mut C, fault: ScanFault) -> SessionEnd {
        log::error!("Scanner fault: {}", fault);
        self.controller.fail();
        self.release().await;
        debug_assert_eq!(self.controller.state(), SessionState::Closed);
        caller.on_fatal_error(&fault);
        caller.on_close();
        SessionEnd::Faulted(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::source::{ScriptStep, ScriptedSource};

    #[derive(Default)]
    struct Calls {
        results: Vec<ScanResult>,
        faults: Vec<ScanFault>,
        closes: usize,
    }

    impl ScanCaller for Calls {
        fn on_scan_success(&mut self, result: ScanResult) {
            self.results.push(result);
        }

        fn on_fatal_error(&mut self, fault: &ScanFault) {
            self.faults.push(fault.clone());
        }

        fn on_close(&mut self) {
            self.closes += 1;
        }
    }

    #[tokio::test]
    async fn test_single_mode_auto_closes() {
        let source = ScriptedSource::from_decodes([("LOC-12", 0), ("LOC-12", 5)]).hold_open(true);
        let probe = source.probe();
        let mut runner = ScanRunner::new(source, CaptureMode::Single, SessionPolicy::default());
        let (_stop_tx, stop_rx) = mpsc::unbounded_channel();
        let mut calls = Calls::default();

        let end = runner.run(&mut calls, stop_rx).await;

        assert_eq!(end, SessionEnd::Completed(ScanResult::Single("LOC-12".into())));
        assert_eq!(calls.results, vec![ScanResult::Single("LOC-12".into())]);
        assert_eq!(calls.closes, 1);
        assert!(!probe.is_running());
        assert_eq!(runner.controller().state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_fault_closes_without_result() {
        let source = ScriptedSource::new(vec![
            ScriptStep::decode("A", 0),
            ScriptStep::Fault(ScanFault::DeviceUnavailable("unplugged".into())),
        ]);
        let probe = source.probe();
        let mut runner = ScanRunner::new(source, CaptureMode::Multiple, SessionPolicy::default());
        let (_stop_tx, stop_rx) = mpsc::unbounded_channel();
        let mut calls = Calls::default();

        let end = runner.run(&mut calls, stop_rx).await;

        assert!(matches!(end, SessionEnd::Faulted(ScanFault::DeviceUnavailable(_))));
        assert!(calls.results.is_empty());
        assert_eq!(calls.faults.len(), 1);
        assert_eq!(calls.closes, 1);
        assert!(!probe.is_running());
    }

    #[tokio::test]
    async fn test_refused_start_is_a_fault() {
        let source = ScriptedSource::new(Vec::new()).refuse_start(ScanFault::PermissionDenied);
        let mut runner = ScanRunner::new(source, CaptureMode::Single, SessionPolicy::default());
        let (_stop_tx, stop_rx) = mpsc::unbounded_channel();
        let mut calls = Calls::default();

        let end = runner.run(&mut calls, stop_rx).await;

        assert_eq!(end, SessionEnd::Faulted(ScanFault::PermissionDenied));
        assert_eq!(calls.closes, 1);
    }

    #[tokio::test]
    async fn test_dropped_stop_sender_cancels() {
        let source = ScriptedSource::new(Vec::new()).hold_open(true);
        let probe = source.probe();
        let mut runner = ScanRunner::new(source, CaptureMode::Multiple, SessionPolicy::default());
        let (stop_tx, stop_rx) = mpsc::unbounded_channel::<StopRequest>();
        drop(stop_tx);
        let mut calls = Calls::default();

        let end = runner.run(&mut calls, stop_rx).await;

        assert_eq!(end, SessionEnd::Cancelled);
        assert!(calls.results.is_empty());
        assert_eq!(calls.closes, 1);
        assert_eq!(probe.release_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_does_not_reopen() {
        let source = ScriptedSource::from_decodes([("LOC-12", 0)]).hold_open(true);
        let probe = source.probe();
        let mut runner = ScanRunner::new(source, CaptureMode::Single, SessionPolicy::default());
        let mut calls = Calls::default();

        let (_stop_tx, stop_rx) = mpsc::unbounded_channel();
        let first = runner.run(&mut calls, stop_rx).await;
        assert!(matches!(first, SessionEnd::Completed(_)));

        let (_stop_tx, stop_rx) = mpsc::unbounded_channel();
        let second = runner.run(&mut calls, stop_rx).await;

        assert_eq!(second, SessionEnd::Cancelled);
        assert_eq!(calls.results.len(), 1);
        assert_eq!(calls.closes, 1);
        assert_eq!(probe.start_count(), 1);
        assert!(!probe.is_running());
        assert_eq!(runner.controller().state(), SessionState::Closed);
    }
}
