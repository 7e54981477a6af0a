//! Delivery of a finished PDF: download to a target, or hand off to a share sheet.
//!
//! Downloads are all-or-nothing. [`DirectoryDelivery`] writes into a temporary file in
//! the destination directory and renames it into place, so a failed write never leaves a
//! partial PDF behind.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::export::assembler::ExportedDocument;
use crate::export::error::ExportError;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Download,
    /// Native share sheet, falling back to download.
    Share,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Download => write!(f, "download"),
            DeliveryMode::Share => write!(f, "share"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(DeliveryMode::Download),
            "share" => Ok(DeliveryMode::Share),
            other => Err(format!("unknown delivery mode '{other}'")),
        }
    }
}

/// How the document actually reached the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Downloaded,
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub method: DeliveryMethod,
    pub filename: String,
    /// Final path for filesystem downloads.
    pub location: Option<PathBuf>,
    pub bytes: usize,
}

impl DeliveryReceipt {
    pub fn downloaded(document: &ExportedDocument, location: Option<PathBuf>) -> Self {
        Self {
            method: DeliveryMethod::Downloaded,
            filename: document.filename.clone(),
            location,
            bytes: document.bytes.len(),
        }
    }

    pub fn shared(document: &ExportedDocument) -> Self {
        Self {
            method: DeliveryMethod::Shared,
            filename: document.filename.clone(),
            location: None,
            bytes: document.bytes.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    /// The user dismissed the share sheet.
    Declined,
}

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

/// Download target for finished documents.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn download(&self, document: &ExportedDocument) -> Result<DeliveryReceipt, ExportError>;
}

/// Platform share sheet.
#[async_trait]
pub trait ShareTarget: Send + Sync {
    /// Whether the platform can share a file of this kind at all.
    fn can_share(&self, document: &ExportedDocument) -> bool;

    async fn share(&self, document: &ExportedDocument) -> Result<ShareOutcome, ExportError>;
}

// ────────────────────────────────────────────────────────────────────────────
// DirectoryDelivery
// ────────────────────────────────────────────────────────────────────────────

/// Saves documents into a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn write_atomically(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    let failed = |what: &str, e: &dyn fmt::Display| {
        ExportError::DeliveryFailed(format!("{what} in {}: {e}", dir.display()))
    };

    // Filenames come from the generator, but never let one escape the directory.
    let name = Path::new(filename)
        .file_name()
        .filter(|name| name.len() == filename.len())
        .ok_or_else(|| ExportError::DeliveryFailed(format!("invalid filename '{filename}'")))?;
    let target = dir.join(name);

    let mut file = NamedTempFile::new_in(dir).map_err(|e| failed("cannot create temp file", &e))?;
    file.write_all(bytes)
        .map_err(|e| failed("cannot write PDF", &e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| failed("cannot sync PDF", &e))?;
    file.persist(&target)
        .map_err(|e| failed("cannot move PDF into place", &e.error))?;
    Ok(target)
}

#[async_trait]
impl Delivery for DirectoryDelivery {
    async fn download(&self, document: &ExportedDocument) -> Result<DeliveryReceipt, ExportError> {
        let dir = self.dir.clone();
        let filename = document.filename.clone();
        let bytes = document.bytes.clone();

        let path = tokio::task::spawn_blocking(move || write_atomically(&dir, &filename, &bytes))
            .await
            .map_err(|e| ExportError::DeliveryFailed(format!("write task failed: {e}")))??;

        info!("Saved {} ({} bytes)", path.display(), document.bytes.len());
        Ok(DeliveryReceipt::downloaded(document, Some(path)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// BufferedDelivery
// ────────────────────────────────────────────────────────────────────────────

/// Keeps the last delivered document in memory for the caller to pick up.
#[derive(Debug, Default)]
pub struct BufferedDelivery {
    delivered: Mutex<Option<ExportedDocument>>,
}

impl BufferedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<ExportedDocument> {
        self.delivered.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl Delivery for BufferedDelivery {
    async fn download(&self, document: &ExportedDocument) -> Result<DeliveryReceipt, ExportError> {
        let mut slot = self
            .delivered
            .lock()
            .map_err(|_| ExportError::DeliveryFailed("delivery buffer poisoned".to_string()))?;
        *slot = Some(document.clone());
        Ok(DeliveryReceipt::downloaded(document, None))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
