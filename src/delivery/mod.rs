//! Label document delivery.
//!
//! # Overview
//!
//! The backend hands back label PDFs as base64 text. [`LabelDeliveryService`]
//! decodes one and makes it available to the operator through the delivery
//! target chosen for the platform at startup:
//!
//! - [`DownloadTarget`] (browser path): saves into the downloads folder under
//!   the requested name, like a save-as download.
//! - [`ShareTarget`] (native path): writes into the app cache and opens the
//!   system share sheet on the file.
//!
//! Every failure is returned as a [`DeliveryError`]; nothing panics past
//! [`LabelDeliveryService::deliver`]. The service never retries.
//!
//! # Example
//!
//! ```no_run
//! use wmscan::delivery::{DeliveryRequest, DownloadTarget, LabelDeliveryService};
//!
//! # async fn demo() {
//! let service = LabelDeliveryService::new(Box::new(DownloadTarget::new("/tmp/downloads")));
//! let request = DeliveryRequest::new("JVBERi0xLjQK", "Etichette_UDM_3_pezzi.pdf");
//! match service.deliver(request).await {
//!     Ok(receipt) => println!("saved {}", receipt.path.display()),
//!     Err(e) => eprintln!("delivery failed: {e}"),
//! }
//! # }
//! ```

pub mod download;
pub mod share;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::DeliverySettings;
use crate::platform::Platform;

pub use download::DownloadTarget;
pub use share::{ShareError, ShareRequest, ShareSheet, ShareTarget, SystemShareSheet};

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF";

/// Error type for delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The filename is empty or would escape the target directory.
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    /// The payload is not valid base64.
    #[error("document is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// The payload decoded to zero bytes.
    #[error("document is empty")]
    EmptyDocument,

    /// The backend result carried no documents.
    #[error("no label documents to deliver")]
    NoDocuments,

    /// No directory is available to write into.
    #[error("no {0} directory available on this system")]
    NoDirectory(&'static str),

    /// Writing the document failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The share sheet rejected or failed to show the document.
    #[error("failed to share {path}: {source}")]
    Share {
        path: PathBuf,
        #[source]
        source: ShareError,
    },
}

impl DeliveryError {
    /// Wrap an I/O error with the path it concerns.
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Whether asking the operator to retry can help.
    ///
    /// Malformed documents will fail the same way again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Share { .. })
    }
}

/// A document to hand to the operator.
#[derive(Clone)]
pub struct DeliveryRequest {
    /// Base64-encoded document; embedded whitespace is tolerated.
    pub document_base64: String,
    /// Filename the operator sees.
    pub filename: String,
}

impl DeliveryRequest {
    /// Create a request.
    #[must_use]
    pub fn new(document_base64: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            document_base64: document_base64.into(),
            filename: filename.into(),
        }
    }
}

impl std::fmt::Debug for DeliveryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryRequest")
            .field(
                "document_base64",
                &format_args!("<{} chars>", self.document_base64.len()),
            )
            .field("filename", &self.filename)
            .finish()
    }
}

/// Proof of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// Where the document was written.
    pub path: PathBuf,
    /// Size of the decoded document.
    pub bytes: u64,
    /// SHA256 of the decoded document, lowercase hex.
    pub sha256: String,
    /// Delivery path taken.
    pub platform: Platform,
    /// When the document was handed over.
    pub delivered_at: DateTime<Utc>,
}

/// Result of one delivery.
pub type DeliveryOutcome = Result<DeliveryReceipt, DeliveryError>;

/// Decode a base64 document, ignoring embedded whitespace.
pub fn decode_document(document_base64: &str) -> Result<Vec<u8>, DeliveryError> {
    let clean: String = document_base64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(clean)?)
}

/// Reject filenames that are empty or could leave the target directory.
pub fn validate_filename(filename: &str) -> Result<(), DeliveryError> {
    let invalid = filename.trim().is_empty()
        || filename == "."
        || filename == ".."
        || filename
            .chars()
            .any(|c| matches!(c, '/' | '\\') || c.is_control());
    if invalid {
        return Err(DeliveryError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Where a decoded document ends up.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    /// Delivery path this target implements.
    fn platform(&self) -> Platform;

    /// Store `bytes` under `filename` and present it. Returns the file written.
    async fn present(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, DeliveryError>;
}

/// Decodes label documents and hands them to the platform's delivery target.
pub struct LabelDeliveryService {
    target: Box<dyn DeliveryTarget>,
}

impl std::fmt::Debug for LabelDeliveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelDeliveryService")
            .field("platform", &self.target.platform())
            .finish()
    }
}

impl LabelDeliveryService {
    /// Service delivering through `target`.
    #[must_use]
    pub fn new(target: Box<dyn DeliveryTarget>) -> Self {
        Self { target }
    }

    /// Service for a platform, using the system share sheet on native.
    pub fn for_platform(
        platform: Platform,
        settings: &DeliverySettings,
    ) -> Result<Self, DeliveryError> {
        let sheet = SystemShareSheet::new(settings.open_command.clone());
        Self::with_share_sheet(platform, settings, Arc::new(sheet))
    }

    /// Service for a platform with a custom share sheet.
    pub fn with_share_sheet(
        platform: Platform,
        settings: &DeliverySettings,
        sheet: Arc<dyn ShareSheet>,
    ) -> Result<Self, DeliveryError> {
        let target: Box<dyn DeliveryTarget> = match platform {
            Platform::Browser => {
                let dir = settings
                    .resolve_downloads_dir()
                    .ok_or(DeliveryError::NoDirectory("downloads"))?;
                Box::new(DownloadTarget::new(dir))
            }
            Platform::Native => {
                let dir = settings
                    .resolve_cache_dir()
                    .ok_or(DeliveryError::NoDirectory("cache"))?;
                Box::new(
                    ShareTarget::new(dir, sheet)
                        .with_title(settings.share_title.clone())
                        .with_text(settings.share_text.clone()),
                )
            }
        };
        log::debug!("Label delivery via {} path", platform);
        Ok(Self::new(target))
    }

    /// Delivery path in use.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.target.platform()
    }

    /// Decode and deliver one document.
    pub async fn deliver(&self, request: DeliveryRequest) -> DeliveryOutcome {
        match self.deliver_inner(&request).await {
            Ok(receipt) => {
                log::info!(
                    "Delivered {} ({}) via {} path",
                    receipt.path.display(),
                    ByteSize::b(receipt.bytes),
                    receipt.platform
                );
                Ok(receipt)
            }
            Err(e) => {
                log::error!("Delivery of {:?} failed: {}", request.filename, e);
                Err(e)
            }
        }
    }

    async fn deliver_inner(&self, request: &DeliveryRequest) -> DeliveryOutcome {
        validate_filename(&request.filename)?;
        let bytes = decode_document(&request.document_base64)?;
        if bytes.is_empty() {
            return Err(DeliveryError::EmptyDocument);
        }
        if !bytes.starts_with(PDF_MAGIC) {
            log::warn!(
                "Document {:?} does not look like a PDF; delivering anyway",
                request.filename
            );
        }

        let path = self.target.present(&bytes, &request.filename).await?;
        Ok(DeliveryReceipt {
            path,
            bytes: bytes.len() as u64,
            sha256: format!("{:x}", Sha256::digest(&bytes)),
            platform: self.target.platform(),
            delivered_at: Utc::now(),
        })
    }
}
