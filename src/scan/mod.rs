//! Continuous QR/barcode scanning sessions.
//!
//! # Architecture
//!
//! * [`event`]: decode events, capture modes and device faults.
//! * [`source`]: the [`ScanEventSource`] capability and its implementations.
//! * [`controller`]: the per-session acceptance state machine.
//! * [`runner`]: wires a source, a controller and feedback to a caller.
//!
//! ```no_run
//! use wmscan::scan::{CaptureMode, LineSource, ScanCaller, ScanResult, ScanRunner, SessionPolicy};
//!
//! struct Page;
//!
//! impl ScanCaller for Page {
//!     fn on_scan_success(&mut self, result: ScanResult) {
//!         println!("captured {:?}", result.codes());
//!     }
//!     fn on_close(&mut self) {}
//! }
//!
//! # async fn demo() {
//! let (_stop_tx, stop_rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut runner = ScanRunner::new(LineSource::stdin(), CaptureMode::Multiple, SessionPolicy::default());
//! runner.run(&mut Page, stop_rx).await;
//! # }
//! ```

pub mod controller;
pub mod event;
pub mod runner;
pub mod source;

pub use controller::{
    CooldownKeying, ScanDecision, ScanResult, ScanSession, ScanSessionController, SessionPolicy,
    SessionState, DEFAULT_COOLDOWN,
};
pub use event::{CaptureMode, ScanEvent, ScanFault, SourceMessage};
pub use runner::{ScanCaller, ScanRunner, SessionEnd, StopRequest};
pub use source::{
    LineSource, ScanEventSource, ScriptStep, ScriptedSource, SessionClock, SourceError, SourceProbe,
};
