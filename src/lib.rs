//! wmscan - warehouse barcode capture and label delivery
//!
//! Continuous QR/barcode scan sessions with cooldown-based duplicate
//! suppression and audio/haptic feedback, plus delivery of generated label
//! PDFs either as a browser-style download or through a native share sheet.

pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod feedback;
pub mod labels;
pub mod logging;
pub mod platform;
pub mod scan;
pub mod signal;

use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use yansi::Paint;

use crate::cli::{Cli, Commands, DeliverArgs, LabelsArgs, ScanArgs};
use crate::config::Config;
use crate::delivery::{DeliveryRequest, LabelDeliveryService};
use crate::error::ExitCode;
use crate::labels::PrintResult;
use crate::platform::Platform;
use crate::scan::{LineSource, ScanCaller, ScanFault, ScanResult, ScanRunner, SessionEnd};

/// Run the command described by `cli`.
///
/// Results go to stdout as JSON; progress and diagnostics go to stderr.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    log::debug!("Effective configuration: {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = match &cli.command {
        Commands::Scan(args) => {
            args.apply(&mut config).context("Invalid command-line options")?;
            runtime.block_on(run_scan(args, &config, cli.quiet))
        }
        Commands::Deliver(args) => {
            args.target.apply(&mut config.delivery);
            runtime.block_on(run_deliver(args, &config))
        }
        Commands::Labels(args) => {
            args.target.apply(&mut config.delivery);
            runtime.block_on(run_labels(args, &config))
        }
    };

    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

/// Prints capture progress to stderr.
#[derive(Debug, Default)]
struct ConsoleCaller {
    quiet: bool,
}

impl ScanCaller for ConsoleCaller {
    fn on_scan_success(&mut self, result: ScanResult) {
        log::debug!("Scan result: {:?}", result.codes());
    }

    fn on_code_accepted(&mut self, code: &str, total: usize) {
        if !self.quiet {
            eprintln!("{} {} {}", "✓".green().bold(), code.bold(), format!("({total})").dim());
        }
    }

    fn on_fatal_error(&mut self, fault: &ScanFault) {
        eprintln!("{} {}", "✗".red().bold(), fault.user_message().red());
    }

    fn on_close(&mut self) {
        log::debug!("Scanner page closed");
    }
}

async fn run_scan(args: &ScanArgs, config: &Config, quiet: bool) -> anyhow::Result<ExitCode> {
    let signal = signal::install_handler()?;
    let (stop_tx, stop_rx) = mpsc::unbounded_channel();
    signal.attach(stop_tx);

    let mut runner = ScanRunner::new(LineSource::stdin(), args.mode, config.scan.policy())
        .with_feedback(config.feedback.build_emitter())
        .allow_empty_close(config.scan.allow_empty_close);
    let mut caller = ConsoleCaller { quiet };
    let end = runner.run(&mut caller, stop_rx).await;
    signal.detach();

    match end {
        SessionEnd::Completed(result) => {
            println!("{}", serde_json::to_string(&result)?);
            Ok(ExitCode::Success)
        }
        SessionEnd::Cancelled if signal.is_interrupted() => Ok(ExitCode::Interrupted),
        SessionEnd::Cancelled => Ok(ExitCode::NothingCaptured),
        SessionEnd::Faulted(fault) => {
            log::debug!("Session faulted: {}", fault);
            Ok(ExitCode::ScanFault)
        }
    }
}

async fn run_deliver(args: &DeliverArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let document = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    deliver(DeliveryRequest::new(document, args.filename.clone()), config).await
}

async fn run_labels(args: &LabelsArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let text = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let result = PrintResult::from_json(&text).context("Failed to read print result")?;
    log::info!(
        "Print result: {} document(s), {} unit(s)",
        result.pdfs.len(),
        result.udm_count
    );
    let request = result
        .into_delivery_request()
        .context("Failed to deliver labels")?;
    deliver(request, config).await
}

async fn deliver(request: DeliveryRequest, config: &Config) -> anyhow::Result<ExitCode> {
    let platform = Platform::resolve(config.delivery.platform);
    log::debug!("Delivery platform {:?} resolved to {}", config.delivery.platform, platform);
    let service = LabelDeliveryService::for_platform(platform, &config.delivery)
        .context("Failed to prepare delivery")?;
    let receipt = service
        .deliver(request)
        .await
        .context("Failed to deliver document")?;

    eprintln!(
        "{} {}",
        "Delivered".green().bold(),
        receipt.path.display().to_string().bold()
    );
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(ExitCode::Success)
}
