//! Command-line interface definitions for `wmscan`.
//!
//! ```bash
//! # Capture one location code, typed or piped one per line
//! wmscan scan
//!
//! # Capture unit codes until Ctrl+C or end of input
//! wmscan scan --mode multiple < codes.txt
//!
//! # Deliver a base64 label document
//! wmscan deliver --input label.b64 --filename Etichette_UDM_3_pezzi.pdf
//!
//! # Deliver the first document of a print procedure response
//! wmscan labels --input response.json --target native
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{Config, ConfigError, DeliverySettings};
use crate::platform::PlatformChoice;
use crate::scan::{CaptureMode, CooldownKeying};

/// Warehouse barcode capture and label delivery.
#[derive(Debug, Parser)]
#[command(name = "wmscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a scan session over codes read from stdin
    Scan(ScanArgs),
    /// Deliver a base64-encoded document
    Deliver(DeliverArgs),
    /// Deliver the label document of a print procedure response
    Labels(LabelsArgs),
}

/// Arguments for `scan`.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Capture one code, or many until stopped
    #[arg(short, long, value_enum, default_value_t = CaptureMode::Single)]
    pub mode: CaptureMode,

    /// Cooldown window in milliseconds
    #[arg(long, value_name = "MS")]
    pub cooldown_ms: Option<u64>,

    /// What the cooldown is keyed on
    #[arg(long, value_enum)]
    pub keying: Option<CooldownKeying>,

    /// Allow stopping a multiple session before any code is captured
    #[arg(long)]
    pub allow_empty_close: bool,

    /// Disable tones and haptics
    #[arg(long)]
    pub no_feedback: bool,
}

impl ScanArgs {
    /// Apply the flags over loaded configuration and validate the result.
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(ms) = self.cooldown_ms {
            config.scan.cooldown_ms = ms;
        }
        if let Some(keying) = self.keying {
            config.scan.cooldown_keying = keying;
        }
        if self.allow_empty_close {
            config.scan.allow_empty_close = true;
        }
        if self.no_feedback {
            config.feedback.enabled = false;
        }
        config.validate()
    }
}

/// Where a document goes.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Delivery path
    #[arg(short, long, value_enum)]
    pub target: Option<PlatformChoice>,

    /// Directory written to, overriding the downloads and cache dirs
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

impl TargetArgs {
    /// Apply the flags over loaded delivery settings.
    pub fn apply(&self, settings: &mut DeliverySettings) {
        if let Some(target) = self.target {
            settings.platform = target;
        }
        if let Some(dir) = &self.output_dir {
            settings.downloads_dir = Some(dir.clone());
            settings.cache_dir = Some(dir.clone());
        }
    }
}

/// Arguments for `deliver`.
#[derive(Debug, Args)]
pub struct DeliverArgs {
    /// File holding the base64 document
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Name the document is delivered under
    #[arg(short, long)]
    pub filename: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `labels`.
#[derive(Debug, Args)]
pub struct LabelsArgs {
    /// Procedure response or bare print result (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_scan_defaults() {
        let cli = Cli::try_parse_from(["wmscan", "scan"]).unwrap();
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.mode, CaptureMode::Single);
                assert_eq!(args.cooldown_ms, None);
                assert!(!args.no_feedback);
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_scan_all_flags() {
        let cli = Cli::try_parse_from([
            "wmscan",
            "-v",
            "scan",
            "--mode",
            "multiple",
            "--cooldown-ms",
            "250",
            "--keying",
            "global",
            "--allow-empty-close",
            "--no-feedback",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);

        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.mode, CaptureMode::Multiple);
                let mut config = Config::default();
                args.apply(&mut config).unwrap();
                assert_eq!(config.scan.cooldown_ms, 250);
                assert_eq!(config.scan.cooldown_keying, CooldownKeying::Global);
                assert!(config.scan.allow_empty_close);
                assert!(!config.feedback.enabled);
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_deliver() {
        let cli = Cli::try_parse_from([
            "wmscan",
            "--json-errors",
            "deliver",
            "--input",
            "label.b64",
            "--filename",
            "a.pdf",
            "--target",
            "native",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();
        assert!(cli.json_errors);

        match cli.command {
            Commands::Deliver(args) => {
                assert_eq!(args.input, PathBuf::from("label.b64"));
                assert_eq!(args.filename, "a.pdf");
                let mut settings = DeliverySettings::default();
                args.target.apply(&mut settings);
                assert_eq!(settings.platform, PlatformChoice::Native);
                assert_eq!(settings.cache_dir, Some(PathBuf::from("/tmp/out")));
            }
            _ => panic!("Expected Deliver command"),
        }
    }

    #[test]
    fn test_cli_cooldown_out_of_range_is_rejected() {
        let cli = Cli::try_parse_from(["wmscan", "scan", "--cooldown-ms", "600000"]).unwrap();
        match cli.command {
            Commands::Scan(args) => {
                let err = args.apply(&mut Config::default()).unwrap_err();
                assert!(matches!(err, ConfigError::Value { key: "scan.cooldown_ms", .. }));
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_labels_requires_input() {
        assert!(Cli::try_parse_from(["wmscan", "labels"]).is_err());
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["wmscan", "-q", "-v", "scan"]).is_err());
    }

    #[test]
    fn test_cli_invalid_mode() {
        assert!(Cli::try_parse_from(["wmscan", "scan", "--mode", "batch"]).is_err());
    }
}
