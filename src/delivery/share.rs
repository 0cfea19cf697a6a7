//! Native path: write into the app cache, then open the share sheet.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::{DeliveryError, DeliveryTarget};
use crate::platform::Platform;

/// Default share sheet title.
pub const DEFAULT_SHARE_TITLE: &str = "UDM labels";

/// Default share sheet text.
pub const DEFAULT_SHARE_TEXT: &str = "Label PDF ready to print or forward";

/// Error reported by a share sheet.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The opener could not be launched.
    #[error("could not launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The opener ran and reported failure.
    #[error("{0}")]
    Rejected(String),
}

/// What the share sheet is asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    /// File to share.
    pub path: PathBuf,
    /// Sheet title.
    pub title: String,
    /// Descriptive text accompanying the file.
    pub text: String,
}

/// Platform sheet letting the user view, save or forward a file.
#[async_trait]
pub trait ShareSheet: Send + Sync {
    /// Present the sheet. Resolves once the platform accepted the request.
    async fn share(&self, request: &ShareRequest) -> Result<(), ShareError>;
}

/// Share sheet backed by the desktop opener (`xdg-open`, `open`, `start`)
/// or a configured command. The file path is appended as the last argument.
#[derive(Debug, Clone, Default)]
pub struct SystemShareSheet {
    command: Option<Vec<String>>,
}

impl SystemShareSheet {
    /// Sheet using `command` instead of the platform opener, if given.
    #[must_use]
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command: command.filter(|argv| !argv.is_empty()),
        }
    }

    fn argv(&self) -> Vec<String> {
        if let Some(argv) = &self.command {
            return argv.clone();
        }
        if cfg!(target_os = "macos") {
            vec!["open".into()]
        } else if cfg!(windows) {
            vec!["cmd".into(), "/C".into(), "start".into(), String::new()]
        } else {
            vec!["xdg-open".into()]
        }
    }
}

#[async_trait]
impl ShareSheet for SystemShareSheet {
    async fn share(&self, request: &ShareRequest) -> Result<(), ShareError> {
        let argv = self.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(ShareError::Rejected("empty opener command".into()));
        };
        log::debug!(
            "Opening {} with {} ({})",
            request.path.display(),
            program,
            request.title
        );

        let status = tokio::process::Command::new(program)
            .args(args)
            .arg(&request.path)
            .env("WMSCAN_SHARE_TITLE", &request.title)
            .env("WMSCAN_SHARE_TEXT", &request.text)
            .status()
            .await
            .map_err(|source| ShareError::Launch {
                program: program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ShareError::Rejected(format!("{program} exited with {status}")))
        }
    }
}

/// Delivery target writing to a cache directory and sharing the file.
pub struct ShareTarget {
    cache_dir: PathBuf,
    sheet: Arc<dyn ShareSheet>,
    title: String,
    text: String,
}

impl std::fmt::Debug for ShareTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareTarget")
            .field("cache_dir", &self.cache_dir)
            .field("title", &self.title)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}

impl ShareTarget {
    /// Target writing into `cache_dir` and presenting through `sheet`.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, sheet: Arc<dyn ShareSheet>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            sheet,
            title: DEFAULT_SHARE_TITLE.to_string(),
            text: DEFAULT_SHARE_TEXT.to_string(),
        }
    }

    /// Set the sheet title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the descriptive text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Cache directory files are written to.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[async_trait]
impl DeliveryTarget for ShareTarget {
    fn platform(&self) -> Platform {
        Platform::Native
    }

    async fn present(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, DeliveryError> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| DeliveryError::write(&self.cache_dir, e))?;

        // Cache copies are scratch space: a later label with the same name
        // replaces the earlier one.
        let path = self.cache_dir.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DeliveryError::write(&path, e))?;

        let request = ShareRequest {
            path: path.clone(),
            title: self.title.clone(),
            text: self.text.clone(),
        };
        self.sheet
            .share(&request)
            .await
            .map_err(|source| DeliveryError::Share {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
