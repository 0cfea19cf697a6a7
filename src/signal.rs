//! Ctrl+C handling for scan sessions.
//!
//! The first interrupt during a scan means "I'm done": it is forwarded to
//! the running session as [`StopRequest::Confirm`], so codes captured so
//! far are still returned. A second one cancels, which also gets out of a
//! multiple-mode session that has nothing to confirm yet. With no session
//! attached the process exits with code 130.
//!
//! ```rust,no_run
//! use wmscan::scan::StopRequest;
//! use wmscan::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let (stop_tx, stop_rx) = tokio::sync::mpsc::unbounded_channel::<StopRequest>();
//! handler.attach(stop_tx);
//! // hand `stop_rx` to the scan runner
//! # drop(stop_rx);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc::UnboundedSender;

use crate::error::ExitCode;
use crate::scan::StopRequest;

/// Shared interrupt state: a flag plus the stop channel of the running
/// session, if any.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    interrupted: Arc<AtomicBool>,
    session: Arc<Mutex<Option<UnboundedSender<StopRequest>>>>,
}

impl StopSignal {
    /// Signal with nothing attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route interrupts to a session's stop channel, replacing any
    /// previous one.
    pub fn attach(&self, stops: UnboundedSender<StopRequest>) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = Some(stops);
        }
    }

    /// Stop routing interrupts to a session.
    pub fn detach(&self) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = None;
        }
    }

    /// Whether an interrupt arrived since the last reset.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Record an interrupt and stop the attached session: confirm the
    /// first time, cancel after that.
    ///
    /// Returns the request a session received, if any.
    pub fn trigger(&self) -> Option<StopRequest> {
        let request = if self.interrupted.swap(true, Ordering::SeqCst) {
            StopRequest::Cancel
        } else {
            StopRequest::Confirm
        };
        let slot = self.session.lock().ok()?;
        let stops = slot.as_ref()?;
        stops.send(request).ok().map(|()| request)
    }

    /// Clear the flag and detach.
    pub fn reset(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
        self.detach();
    }
}

/// Error installing the Ctrl+C handler.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The process-wide handler could not be set.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_SIGNAL: OnceLock<StopSignal> = OnceLock::new();

/// Line printed after an interrupt reached the session.
///
/// A multiple-mode session with no codes yet ignores the confirm.
fn interrupt_message(request: StopRequest) -> &'static str {
    match request {
        StopRequest::Confirm => "Interrupted. Press Ctrl+C again to cancel the scan.",
        StopRequest::Cancel => "Interrupted again. Cancelling scan...",
    }
}

/// Install the process-wide Ctrl+C handler.
///
/// Repeated calls return the installed signal, reset. If another handler
/// owns SIGINT already, an unhooked signal is returned so callers still
/// work; it only fires through [`StopSignal::trigger`].
pub fn install_handler() -> Result<StopSignal, SignalError> {
    if let Some(signal) = GLOBAL_SIGNAL.get() {
        signal.reset();
        return Ok(signal.clone());
    }

    let signal = StopSignal::new();
    let hooked = signal.clone();
    let installed = ctrlc::set_handler(move || {
        log::info!("Interrupt received");
        let mut stderr = std::io::stderr();
        if let Some(request) = hooked.trigger() {
            let _ = writeln!(stderr, "\n{}", interrupt_message(request));
            let _ = stderr.flush();
        } else {
            let _ = writeln!(stderr, "\nInterrupted.");
            let _ = stderr.flush();
            std::process::exit(ExitCode::Interrupted.as_i32());
        }
    });

    match installed {
        Ok(()) => {
            let _ = GLOBAL_SIGNAL.set(signal.clone());
            Ok(signal)
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C handler already registered, using unhooked signal");
            Ok(GLOBAL_SIGNAL.get_or_init(StopSignal::new).clone())
        }
        Err(e) => Err(e.into()),
    }
}
