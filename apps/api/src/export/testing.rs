//! Test doubles shared by the export module tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tokio::sync::oneshot;

use crate::export::assembler::ExportedDocument;
use crate::export::delivery::{ShareOutcome, ShareTarget};
use crate::export::error::ExportError;
use crate::export::notify::{Notification, NotificationSink};
use crate::export::surface::{CaptureRequest, RasterSurface, RenderSurface, SurfaceSize};
use crate::fonts::{FontCatalog, FontError};

/// A document whose every row has its own colour, so bands can be matched back to
/// their source rows. No pixel is ever page-background white.
pub fn striped_document(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |_, y| {
        Rgba([(y % 251) as u8, ((y / 251) % 251) as u8, 100, 255])
    })
}

/// A surface that lays out fine but never finishes capturing.
pub struct HangingSurface {
    size: SurfaceSize,
}

impl HangingSurface {
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            size: SurfaceSize { width_px, height_px },
        }
    }
}

#[async_trait]
impl RenderSurface for HangingSurface {
    fn measure(&self) -> Option<SurfaceSize> {
        Some(self.size)
    }

    async fn capture(&self, _request: &CaptureRequest) -> Result<RgbaImage, ExportError> {
        std::future::pending().await
    }
}

/// A raster surface whose capture waits until the returned sender fires.
pub struct GatedSurface {
    inner: RasterSurface,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedSurface {
    pub fn new(document: RgbaImage) -> (Self, oneshot::Sender<()>) {
        let (release, gate) = oneshot::channel();
        let surface = Self {
            inner: RasterSurface::new(document),
            gate: Mutex::new(Some(gate)),
        };
        (surface, release)
    }
}

#[async_trait]
impl RenderSurface for GatedSurface {
    fn measure(&self) -> Option<SurfaceSize> {
        self.inner.measure()
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<RgbaImage, ExportError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.capture(request).await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications().into_iter().map(|n| n.message).collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

/// Font catalog that records requests and optionally fails them.
#[derive(Default)]
pub struct StubFontCatalog {
    pub fail: bool,
    requested: Mutex<Vec<String>>,
}

impl StubFontCatalog {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FontCatalog for StubFontCatalog {
    async fn ensure_loaded(&self, family: &str) -> Result<(), FontError> {
        self.requested.lock().unwrap().push(family.to_string());
        if self.fail {
            return Err(FontError::Missing(family.to_string()));
        }
        Ok(())
    }
}

/// Share sheet with a fixed capability and answer.
pub struct StubShareTarget {
    pub available: bool,
    pub outcome: ShareOutcome,
    pub calls: AtomicUsize,
}

impl StubShareTarget {
    pub fn new(available: bool, outcome: ShareOutcome) -> Self {
        Self {
            available,
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShareTarget for StubShareTarget {
    fn can_share(&self, _document: &ExportedDocument) -> bool {
        self.available
    }

    async fn share(&self, _document: &ExportedDocument) -> Result<ShareOutcome, ExportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome)
    }
}
