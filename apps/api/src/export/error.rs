use thiserror::Error;

/// Terminal failures of a single export attempt.
///
/// None of these are retried automatically. The orchestrator surfaces each one as an
/// error notification and logs it; the user re-triggers the export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid page geometry: {0}")]
    InvalidGeometry(String),

    #[error("Capture target '{0}' not found")]
    CaptureTargetMissing(String),

    #[error("Capture of '{target}' timed out after {timeout_ms}ms")]
    CaptureTimeout { target: String, timeout_ms: u64 },

    #[error("Capture of '{target}' failed: {reason}")]
    CaptureFailed { target: String, reason: String },

    #[error("PDF assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("Document needs {pages} pages, limit is {limit}")]
    PageLimitExceeded { pages: u32, limit: u32 },

    #[error("Page rasters need {pixels} pixels, limit is {limit}")]
    RasterTooLarge { pixels: u64, limit: u64 },

    #[error("Export cancelled after {completed} of {total} pages")]
    Cancelled { completed: u32, total: u32 },

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

impl ExportError {
    /// Stable machine-readable code, used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::InvalidGeometry(_) => "INVALID_GEOMETRY",
            ExportError::CaptureTargetMissing(_) => "CAPTURE_TARGET_MISSING",
            ExportError::CaptureTimeout { .. } => "CAPTURE_TIMEOUT",
            ExportError::CaptureFailed { .. } => "CAPTURE_FAILED",
            ExportError::AssemblyFailed(_) => "ASSEMBLY_FAILED",
            ExportError::PageLimitExceeded { .. } => "PAGE_LIMIT_EXCEEDED",
            ExportError::RasterTooLarge { .. } => "RASTER_TOO_LARGE",
            ExportError::Cancelled { .. } => "CANCELLED",
            ExportError::DeliveryFailed(_) => "DELIVERY_FAILED",
        }
    }
}
