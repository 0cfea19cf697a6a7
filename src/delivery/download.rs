//! Save-as download into a directory.
//!
//! The document is written to a temporary file next to its destination and
//! then persisted under the requested name without clobbering: an existing
//! `label.pdf` makes the download land as `label (1).pdf`, the way browsers
//! number repeated downloads. The temporary file never outlives the call.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::{DeliveryError, DeliveryTarget};
use crate::platform::Platform;

/// Numbered variants tried before giving up on a free name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Delivery target saving into a downloads directory.
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    dir: PathBuf,
}

impl DownloadTarget {
    /// Target saving into `dir`, created on first use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory downloads are saved into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DeliveryTarget for DownloadTarget {
    fn platform(&self) -> Platform {
        Platform::Browser
    }

    async fn present(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, DeliveryError> {
        let dir = self.dir.clone();
        let bytes = bytes.to_vec();
        let filename = filename.to_string();
        let task_dir = dir.clone();
        tokio::task::spawn_blocking(move || save_download(&task_dir, &filename, &bytes))
            .await
            .map_err(|e| DeliveryError::write(dir, io::Error::other(e)))?
    }
}

fn save_download(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, DeliveryError> {
    std::fs::create_dir_all(dir).map_err(|e| DeliveryError::write(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DeliveryError::write(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| DeliveryError::write(tmp.path(), e))?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = dir.join(numbered_name(filename, attempt));
        match tmp.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => return Err(DeliveryError::write(candidate, e.error)),
        }
    }

    Err(DeliveryError::write(
        dir.join(filename),
        io::Error::new(io::ErrorKind::AlreadyExists, "no free download name"),
    ))
}

/// `label.pdf`, `label (1).pdf`, `label (2).pdf`, ...
fn numbered_name(filename: &str, n: u32) -> String {
    if n == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{filename} ({n})"),
    }
}
