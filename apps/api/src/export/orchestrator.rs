//! Export Orchestrator: runs capture → slice → assemble → deliver for one document.
//!
//! # Flow
//! 1. Validate options into a [`PageGeometry`].
//! 2. Await the font catalog for the requested family (failure is a warning only).
//! 3. Wait for the settle delay so the renderer has painted.
//! 4. Slice the root container into pages with the configured strategy.
//! 5. Assemble the PDF on the blocking pool.
//! 6. Deliver: download, or share with download fallback.
//!
//! Any failure aborts the remaining stages; nothing is delivered for a failed run.
//!
//! # Status
//! `Idle → Exporting → Succeeded | Failed → Idle`. The return to idle happens after
//! the notification's dismiss window. A newer run supersedes a pending reset.
//! The orchestrator does not enforce single flight; callers should not trigger an
//! export while [`ExportOrchestrator::is_exporting`] is true.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::export::assembler::{ExportedDocument, FitPolicy, PdfAssembler};
use crate::export::delivery::{
    Delivery, DeliveryMethod, DeliveryMode, DeliveryReceipt, ShareOutcome, ShareTarget,
};
use crate::export::error::ExportError;
use crate::export::filename::filename_for_today;
use crate::export::geometry::{PageGeometry, PaperFormat};
use crate::export::notify::{Notification, NotificationSink};
use crate::export::slicer::{CancellationFlag, SliceContext, SlicingStrategy};
use crate::export::surface::{RenderSource, PAGE_BACKGROUND};
use crate::fonts::FontCatalog;

pub const MIN_QUALITY: f32 = 1.0;
pub const MAX_QUALITY: f32 = 4.0;

const MSG_STARTED: &str = "Generating PDF...";
const MSG_DOWNLOADED: &str = "PDF downloaded successfully!";
const MSG_FAILED: &str = "Failed to generate PDF. Please try again.";
const MSG_SHARED: &str = "Resume shared successfully!";
const MSG_SHARE_FALLBACK: &str = "Resume downloaded for sharing!";
const MSG_SHARE_FAILED: &str = "Failed to share resume.";
const MSG_CANCELLED: &str = "PDF export cancelled.";

// ────────────────────────────────────────────────────────────────────────────
// Options and limits
// ────────────────────────────────────────────────────────────────────────────

/// Per-export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Explicit filename; generated from `subject_name` when absent.
    pub filename: Option<String>,
    pub subject_name: Option<String>,
    /// Raster scale multiplier, `1.0..=4.0`.
    pub quality: f32,
    pub format: PaperFormat,
    pub margin_mm: f64,
    /// Overrides the pixel budget derived from the printable height.
    pub pixels_per_page: Option<u32>,
    pub fit: FitPolicy,
    pub strategy: SlicingStrategy,
    pub font_family: Option<String>,
    pub delivery: DeliveryMode,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            filename: None,
            subject_name: None,
            quality: 2.0,
            format: PaperFormat::A4,
            margin_mm: 12.0,
            pixels_per_page: None,
            fit: FitPolicy::Stretch,
            strategy: SlicingStrategy::BandCrop,
            font_family: None,
            delivery: DeliveryMode::Download,
        }
    }
}

impl ExportOptions {
    /// Checks the options and derives the page geometry.
    pub fn validate(&self) -> Result<PageGeometry, ExportError> {
        if !self.quality.is_finite() || !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(ExportError::InvalidGeometry(format!(
                "quality must be between {MIN_QUALITY} and {MAX_QUALITY}, got {}",
                self.quality
            )));
        }
        let geometry = PageGeometry::new(self.format, self.margin_mm)?;
        match self.pixels_per_page {
            Some(pixels_per_page) => geometry.with_pixels_per_page(pixels_per_page),
            None => Ok(geometry),
        }
    }

    /// The filename to deliver under, always ending in `.pdf`.
    pub fn resolve_filename(&self) -> String {
        match self.filename.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                if name.to_ascii_lowercase().ends_with(".pdf") {
                    name.to_string()
                } else {
                    format!("{name}.pdf")
                }
            }
            _ => filename_for_today(self.subject_name.as_deref()),
        }
    }
}

/// Operational bounds shared by every run of one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportLimits {
    pub capture_timeout: Duration,
    pub settle_delay: Duration,
    pub max_pages: u32,
    /// Combined size of all page rasters of one run, in pixels.
    pub max_raster_pixels: u64,
    /// How long a success notification stays up (and the status stays `Succeeded`).
    pub success_dismiss: Duration,
    /// Same for failures.
    pub error_dismiss: Duration,
}

impl Default for ExportLimits {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_millis(100),
            max_pages: 20,
            // 1 GiB of RGBA; fits 20 A4 pages at the maximum quality.
            max_raster_pixels: 1 << 28,
            success_dismiss: Duration::from_secs(3),
            error_dismiss: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    #[default]
    Idle,
    Exporting,
    Succeeded,
    Failed,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub run_id: Uuid,
    pub document: ExportedDocument,
    pub receipt: DeliveryReceipt,
    pub strategy: SlicingStrategy,
    pub elapsed: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

pub struct ExportOrchestrator {
    source: Arc<dyn RenderSource>,
    fonts: Arc<dyn FontCatalog>,
    notifier: Arc<dyn NotificationSink>,
    delivery: Arc<dyn Delivery>,
    share: Option<Arc<dyn ShareTarget>>,
    limits: ExportLimits,
    status: Arc<watch::Sender<ExportStatus>>,
    generation: Arc<AtomicU64>,
}

impl ExportOrchestrator {
    pub fn new(
        source: Arc<dyn RenderSource>,
        fonts: Arc<dyn FontCatalog>,
        notifier: Arc<dyn NotificationSink>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        let (status, _) = watch::channel(ExportStatus::Idle);
        Self {
            source,
            fonts,
            notifier,
            delivery,
            share: None,
            limits: ExportLimits::default(),
            status: Arc::new(status),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_share(mut self, share: Arc<dyn ShareTarget>) -> Self {
        self.share = Some(share);
        self
    }

    pub fn with_limits(mut self, limits: ExportLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn status(&self) -> ExportStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportStatus> {
        self.status.subscribe()
    }

    pub fn is_exporting(&self) -> bool {
        self.status() == ExportStatus::Exporting
    }

    /// Exports the document rooted at `root_id`.
    ///
    /// Notifications and status transitions are emitted here; the returned error is the
    /// same one the user was notified about.
    pub async fn export(
        &self,
        root_id: &str,
        options: &ExportOptions,
        cancel: &CancellationFlag,
    ) -> Result<ExportReport, ExportError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "export",
            %run_id,
            root_id,
            format = %options.format,
            strategy = %options.strategy
        );

        async {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.status.send_replace(ExportStatus::Exporting);
            self.notifier.notify(Notification::info(MSG_STARTED));
            info!("Export started (quality {}, {})", options.quality, options.fit);

            let started = Instant::now();
            let result = self.run(root_id, options, cancel).await;
            let elapsed = started.elapsed();

            match result {
                Ok((document, receipt)) => {
                    info!(
                        "Export finished: {} pages, {} bytes in {}ms",
                        document.page_count,
                        document.bytes.len(),
                        elapsed.as_millis()
                    );
                    self.notifier
                        .notify(success_notification(options.delivery, &receipt, self.limits.success_dismiss));
                    self.finish(generation, ExportStatus::Succeeded, self.limits.success_dismiss);
                    Ok(ExportReport {
                        run_id,
                        document,
                        receipt,
                        strategy: options.strategy,
                        elapsed,
                    })
                }
                Err(e @ ExportError::Cancelled { .. }) => {
                    info!("Export cancelled: {e}");
                    self.notifier.notify(Notification::info(MSG_CANCELLED));
                    self.status.send_replace(ExportStatus::Idle);
                    Err(e)
                }
                Err(e) => {
                    error!("Export failed [{}]: {e}", e.code());
                    let message = match options.delivery {
                        DeliveryMode::Download => MSG_FAILED,
                        DeliveryMode::Share => MSG_SHARE_FAILED,
                    };
                    self.notifier
                        .notify(Notification::error(message).dismiss_after(self.limits.error_dismiss));
                    self.finish(generation, ExportStatus::Failed, self.limits.error_dismiss);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        root_id: &str,
        options: &ExportOptions,
        cancel: &CancellationFlag,
    ) -> Result<(ExportedDocument, DeliveryReceipt), ExportError> {
        let geometry = options.validate()?;

        if let Some(family) = options.font_family.as_deref() {
            if let Err(e) = self.fonts.ensure_loaded(family).await {
                warn!("Font '{family}' unavailable, continuing with fallback glyphs: {e}");
            }
        }

        if !self.limits.settle_delay.is_zero() {
            tokio::time::sleep(self.limits.settle_delay).await;
        }

        let ctx = SliceContext {
            geometry: &geometry,
            quality: options.quality,
            background: PAGE_BACKGROUND,
            capture_timeout: self.limits.capture_timeout,
            max_pages: self.limits.max_pages,
            max_raster_pixels: self.limits.max_raster_pixels,
            cancel,
        };
        let pages = options
            .strategy
            .slicer()
            .slice(self.source.as_ref(), root_id, &ctx)
            .await?;
        info!("Captured {} page(s)", pages.len());

        let filename = options.resolve_filename();
        let title = filename.trim_end_matches(".pdf").to_string();
        let assembler = PdfAssembler::new(geometry, options.fit).with_title(title);
        let document = tokio::task::spawn_blocking(move || assembler.assemble(pages, filename))
            .await
            .map_err(|e| ExportError::AssemblyFailed(format!("assembly task failed: {e}")))??;

        let receipt = match options.delivery {
            DeliveryMode::Download => self.delivery.download(&document).await?,
            DeliveryMode::Share => self.share_or_download(&document).await?,
        };
        Ok((document, receipt))
    }

    async fn share_or_download(&self, document: &ExportedDocument) -> Result<DeliveryReceipt, ExportError> {
        if let Some(share) = self.share.as_ref().filter(|share| share.can_share(document)) {
            match share.share(document).await? {
                ShareOutcome::Shared => return Ok(DeliveryReceipt::shared(document)),
                ShareOutcome::Declined => info!("Share declined, downloading instead"),
            }
        } else {
            info!("Sharing unavailable, downloading instead");
        }
        self.delivery.download(document).await
    }

    /// Sets the terminal status and schedules the return to idle.
    fn finish(&self, generation: u64, status: ExportStatus, reset_after: Duration) {
        self.status.send_replace(status);

        let sender = Arc::clone(&self.status);
        let current = Arc::clone(&self.generation);
        tokio::spawn(async move {
            tokio::time::sleep(reset_after).await;
            if current.load(Ordering::SeqCst) == generation {
                sender.send_if_modified(|status| {
                    let terminal = matches!(*status, ExportStatus::Succeeded | ExportStatus::Failed);
                    if terminal {
                        *status = ExportStatus::Idle;
                    }
                    terminal
                });
            }
        });
    }
}

fn success_notification(mode: DeliveryMode, receipt: &DeliveryReceipt, dismiss: Duration) -> Notification {
    let notification = match (mode, receipt.method) {
        (DeliveryMode::Download, _) => Notification::success(MSG_DOWNLOADED),
        (DeliveryMode::Share, DeliveryMethod::Shared) => Notification::success(MSG_SHARED),
        (DeliveryMode::Share, DeliveryMethod::Downloaded) => Notification::info(MSG_SHARE_FALLBACK),
    };
    notification.dismiss_after(dismiss)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::delivery::{BufferedDelivery, DirectoryDelivery};
    use crate::export::notify::NotificationLevel;
    use crate::export::surface::{InMemoryRenderSource, RasterSurface};
    use crate::export::testing::{
        striped_document, GatedSurface, HangingSurface, RecordingNotifier, StubFontCatalog,
        StubShareTarget,
    };

    const ROOT: &str = "resume-preview";

    struct Harness {
        source: Arc<InMemoryRenderSource>,
        notifier: Arc<RecordingNotifier>,
        fonts: Arc<StubFontCatalog>,
        delivery: Arc<BufferedDelivery>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_fonts(StubFontCatalog::default())
        }

        fn with_fonts(fonts: StubFontCatalog) -> Self {
            Self {
                source: Arc::new(InMemoryRenderSource::new()),
                notifier: Arc::new(RecordingNotifier::default()),
                fonts: Arc::new(fonts),
                delivery: Arc::new(BufferedDelivery::new()),
            }
        }

        fn orchestrator(&self) -> ExportOrchestrator {
            ExportOrchestrator::new(
                self.source.clone(),
                self.fonts.clone(),
                self.notifier.clone(),
                self.delivery.clone(),
            )
            .with_limits(ExportLimits {
                settle_delay: Duration::ZERO,
                ..ExportLimits::default()
            })
        }

        fn mount(&self, height: u32, options: &ExportOptions) {
            let geometry = options.validate().unwrap();
            self.source
                .mount_paged(ROOT, RasterSurface::new(striped_document(120, height)), &geometry);
        }
    }

    fn options() -> ExportOptions {
        ExportOptions {
            quality: 1.0,
            pixels_per_page: Some(960),
            subject_name: Some("Ada Lovelace".to_string()),
            ..ExportOptions::default()
        }
    }

    fn pdf_pages(bytes: &[u8]) -> usize {
        lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[tokio::test]
    async fn test_exports_and_downloads_every_page() {
        for strategy in [SlicingStrategy::BandCrop, SlicingStrategy::BoundedContainers] {
            let harness = Harness::new();
            let options = ExportOptions { strategy, ..options() };
            harness.mount(2450, &options);

            let report = harness
                .orchestrator()
                .export(ROOT, &options, &CancellationFlag::new())
                .await
                .unwrap();

            assert_eq!(report.document.page_count, 3);
            assert_eq!(pdf_pages(&report.document.bytes), 3);
            assert_eq!(report.strategy, strategy);
            let delivered = harness.delivery.take().unwrap();
            assert_eq!(delivered.bytes, report.document.bytes);
            assert!(delivered.filename.starts_with("Ada Lovelace "));
            assert_eq!(
                harness.notifier.messages(),
                vec![MSG_STARTED.to_string(), MSG_DOWNLOADED.to_string()]
            );
        }
    }

    #[tokio::test]
    async fn test_letter_single_page_placement() {
        let harness = Harness::new();
        let options = ExportOptions {
            quality: 2.0,
            format: PaperFormat::Letter,
            margin_mm: 12.0,
            pixels_per_page: None,
            ..options()
        };
        harness.mount(500, &options);

        let report = harness
            .orchestrator()
            .export(ROOT, &options, &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(pdf_pages(&report.document.bytes), 1);
        let placement = report.document.placements[0];
        assert_eq!((placement.x_mm, placement.y_mm), (12.0, 12.0));
        assert_eq!(placement.width_mm, 192.0);
    }

    #[tokio::test]
    async fn test_missing_root_produces_no_download() {
        let harness = Harness::new();
        let orchestrator = harness.orchestrator();

        let result = orchestrator
            .export("does-not-exist", &options(), &CancellationFlag::new())
            .await;

        assert!(matches!(result, Err(ExportError::CaptureTargetMissing(_))));
        assert!(harness.delivery.take().is_none());
        let notifications = harness.notifier.notifications();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[1].level, NotificationLevel::Error);
        assert_eq!(notifications[1].message, MSG_FAILED);
        assert!(notifications
            .iter()
            .all(|n| n.level != NotificationLevel::Success));
        assert_eq!(orchestrator.status(), ExportStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_export_leaves_no_file_on_disk() {
        let harness = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ExportOrchestrator::new(
            harness.source.clone(),
            harness.fonts.clone(),
            harness.notifier.clone(),
            Arc::new(DirectoryDelivery::new(dir.path())),
        )
        .with_limits(ExportLimits {
            settle_delay: Duration::ZERO,
            ..ExportLimits::default()
        });

        let result = orchestrator
            .export(ROOT, &options(), &CancellationFlag::new())
            .await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sequential_exports_do_not_share_buffers() {
        let harness = Harness::new();
        let orchestrator = harness.orchestrator();
        let options = options();
        harness.mount(1500, &options);

        let first = orchestrator
            .export(ROOT, &options, &CancellationFlag::new())
            .await
            .unwrap();
        let saved = first.document.bytes.to_vec();

        // Replace the source document with different content at the same id.
        let geometry = options.validate().unwrap();
        let replacement = image::RgbaImage::from_pixel(120, 3000, image::Rgba([200, 10, 10, 255]));
        harness
            .source
            .mount_paged(ROOT, RasterSurface::new(replacement), &geometry);

        let second = orchestrator
            .export(ROOT, &options, &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(first.document.bytes.as_ref(), saved.as_slice());
        assert_ne!(second.document.bytes, first.document.bytes);
        assert_eq!(first.document.page_count, 2);
        assert_eq!(second.document.page_count, 4);
    }

    #[tokio::test]
    async fn test_invalid_quality_is_invalid_geometry() {
        let harness = Harness::new();
        let options = ExportOptions {
            quality: 0.5,
            ..options()
        };
        let result = harness
            .orchestrator()
            .export(ROOT, &options, &CancellationFlag::new())
            .await;
        assert!(matches!(result, Err(ExportError::InvalidGeometry(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_pixel_budget() {
        for pixels_per_page in [20_000_000, u32::MAX] {
            let options = ExportOptions {
                pixels_per_page: Some(pixels_per_page),
                ..options()
            };
            assert!(matches!(options.validate(), Err(ExportError::InvalidGeometry(_))));
        }
    }

    #[tokio::test]
    async fn test_raster_budget_fails_before_capture() {
        let harness = Harness::new();
        let options = options();
        harness.mount(2450, &options);
        let orchestrator = harness.orchestrator().with_limits(ExportLimits {
            max_raster_pixels: 100_000,
            settle_delay: Duration::ZERO,
            ..ExportLimits::default()
        });

        let result = orchestrator
            .export(ROOT, &options, &CancellationFlag::new())
            .await;
        assert!(matches!(
            result,
            Err(ExportError::RasterTooLarge { limit: 100_000, .. })
        ));
        assert!(harness.delivery.take().is_none());
        assert_eq!(orchestrator.status(), ExportStatus::Failed);
    }

    #[tokio::test]
    async fn test_status_is_exporting_while_capture_is_pending() {
        let harness = Harness::new();
        let (surface, release) = GatedSurface::new(striped_document(120, 900));
        harness.source.mount(ROOT, Arc::new(surface));
        let orchestrator = Arc::new(harness.orchestrator());
        let mut status = orchestrator.subscribe();
        assert!(!orchestrator.is_exporting());

        let run = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                orchestrator
                    .export(ROOT, &options(), &CancellationFlag::new())
                    .await
            }
        });

        status
            .wait_for(|status| *status == ExportStatus::Exporting)
            .await
            .unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(orchestrator.status(), ExportStatus::Exporting);
        assert!(orchestrator.is_exporting());
        assert!(harness.delivery.take().is_none());

        release.send(()).unwrap();
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.document.page_count, 1);
        assert_eq!(orchestrator.status(), ExportStatus::Succeeded);
        assert!(!orchestrator.is_exporting());
        assert!(harness.delivery.take().is_some());
    }

    #[tokio::test]
    async fn test_font_failure_is_not_fatal() {
        let harness = Harness::with_fonts(StubFontCatalog::failing());
        let options = ExportOptions {
            font_family: Some("Merriweather".to_string()),
            ..options()
        };
        harness.mount(900, &options);

        let report = harness
            .orchestrator()
            .export(ROOT, &options, &CancellationFlag::new())
            .await;

        assert!(report.is_ok());
        assert_eq!(harness.fonts.requested(), vec!["Merriweather".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_export_returns_to_idle() {
        let harness = Harness::new();
        let orchestrator = harness.orchestrator();
        let options = options();
        harness.mount(2450, &options);
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result = orchestrator.export(ROOT, &options, &cancel).await;

        assert!(matches!(result, Err(ExportError::Cancelled { .. })));
        assert_eq!(orchestrator.status(), ExportStatus::Idle);
        assert!(harness.delivery.take().is_none());
        assert_eq!(harness.notifier.messages().last().map(String::as_str), Some(MSG_CANCELLED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_returns_to_idle_after_dismiss_window() {
        let harness = Harness::new();
        let orchestrator = harness.orchestrator();
        let options = options();
        harness.mount(900, &options);
        let mut status = orchestrator.subscribe();

        orchestrator
            .export(ROOT, &options, &CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(*status.borrow_and_update(), ExportStatus::Succeeded);

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(orchestrator.status(), ExportStatus::Succeeded);

        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), ExportStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_lingers_longer() {
        let harness = Harness::new();
        let orchestrator = harness.orchestrator();

        let _ = orchestrator
            .export("missing", &options(), &CancellationFlag::new())
            .await;

        let error = &harness.notifier.notifications()[1];
        assert_eq!(error.dismiss_after, Some(Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(orchestrator.status(), ExportStatus::Failed);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orchestrator.status(), ExportStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_capture_fails_with_timeout() {
        let harness = Harness::new();
        harness
            .source
            .mount(ROOT, Arc::new(HangingSurface::new(120, 900)));
        let orchestrator = harness.orchestrator().with_limits(ExportLimits {
            capture_timeout: Duration::from_secs(2),
            settle_delay: Duration::ZERO,
            ..ExportLimits::default()
        });

        let result = orchestrator
            .export(ROOT, &options(), &CancellationFlag::new())
            .await;

        assert!(matches!(
            result,
            Err(ExportError::CaptureTimeout { timeout_ms: 2000, .. })
        ));
        assert!(harness.delivery.take().is_none());
    }

    #[tokio::test]
    async fn test_page_guard_rejects_long_documents() {
        let harness = Harness::new();
        let options = options();
        harness.mount(960 * 3, &options);
        let orchestrator = harness.orchestrator().with_limits(ExportLimits {
            max_pages: 2,
            settle_delay: Duration::ZERO,
            ..ExportLimits::default()
        });

        let result = orchestrator
            .export(ROOT, &options, &CancellationFlag::new())
            .await;
        assert!(matches!(
            result,
            Err(ExportError::PageLimitExceeded { pages: 3, limit: 2 })
        ));
    }

    // ── share flow ──────────────────────────────────────────────────────────

    async fn share_export(share: Arc<StubShareTarget>) -> (Harness, ExportReport) {
        let harness = Harness::new();
        let options = ExportOptions {
            delivery: DeliveryMode::Share,
            ..options()
        };
        harness.mount(900, &options);
        let report = harness
            .orchestrator()
            .with_share(share)
            .export(ROOT, &options, &CancellationFlag::new())
            .await
            .unwrap();
        (harness, report)
    }

    #[tokio::test]
    async fn test_share_when_available() {
        let share = Arc::new(StubShareTarget::new(true, ShareOutcome::Shared));
        let (harness, report) = share_export(share.clone()).await;

        assert_eq!(share.calls(), 1);
        assert_eq!(report.receipt.method, DeliveryMethod::Shared);
        assert!(harness.delivery.take().is_none());
        assert_eq!(harness.notifier.messages().last().map(String::as_str), Some(MSG_SHARED));
    }

    #[tokio::test]
    async fn test_share_unsupported_falls_back_to_download() {
        let share = Arc::new(StubShareTarget::new(false, ShareOutcome::Shared));
        let (harness, report) = share_export(share.clone()).await;

        assert_eq!(share.calls(), 0);
        assert_eq!(report.receipt.method, DeliveryMethod::Downloaded);
        assert!(harness.delivery.take().is_some());
        let last = harness.notifier.notifications().pop().unwrap();
        assert_eq!(last.message, MSG_SHARE_FALLBACK);
        assert_eq!(last.level, NotificationLevel::Info);
    }

    #[tokio::test]
    async fn test_share_declined_falls_back_to_download() {
        let share = Arc::new(StubShareTarget::new(true, ShareOutcome::Declined));
        let (harness, report) = share_export(share.clone()).await;

        assert_eq!(share.calls(), 1);
        assert_eq!(report.receipt.method, DeliveryMethod::Downloaded);
        assert!(harness.delivery.take().is_some());
    }

    #[test]
    fn test_resolve_filename() {
        let explicit = ExportOptions {
            filename: Some("My CV".to_string()),
            ..ExportOptions::default()
        };
        assert_eq!(explicit.resolve_filename(), "My CV.pdf");

        let generated = ExportOptions {
            subject_name: Some("Sarah Johnson!!".to_string()),
            ..ExportOptions::default()
        };
        assert!(generated.resolve_filename().starts_with("Sarah Johnson 20"));
    }
}
